use actix_web::{web, App, HttpServer};
use async_trait::async_trait;
use common::telemetry::{get_tracing_subscriber, init_tracing_subscriber};
use futures::{stream, StreamExt};
use once_cell::sync::Lazy;
use professor_chat_service::{
    configuration::get_configuration,
    domain::entities::{
        embedding::Embedding,
        message::Message,
        professor_match::{ProfessorMatch, ProfessorMetadata},
    },
    ports::{
        completion_client::{
            CompletionClient, CompletionClientError, CompletionFragment, FragmentStream,
        },
        embedder::{Embedder, EmbedderError},
        vector_index::{VectorIndex, VectorIndexError},
    },
    startup::{Application, Backends},
};
use std::{
    net::TcpListener,
    sync::{Arc, Mutex},
    time::Duration,
};

// Ensures that the `tracing` stack is only initialized once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info";
    let subscriber_name = "test";

    // The sink is part of the subscriber type: each branch builds and installs its own subscriber
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_tracing_subscriber(subscriber).expect("Failed to set up tracing");
    } else {
        let subscriber =
            get_tracing_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_tracing_subscriber(subscriber).expect("Failed to set up tracing");
    };
});

pub struct TestApp {
    pub address: String,
    pub embedder: Arc<FakeEmbedder>,
    pub vector_index: Arc<FakeVectorIndex>,
    pub completion: Arc<FakeCompletion>,
}

/// A test API client
impl TestApp {
    /// Sends a POST request to the "/api/chat" route with a JSON body
    pub async fn post_chat(&self, body: &serde_json::Value) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}/api/chat", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Sends a POST request to the "/api/chat" route with a raw body
    pub async fn post_raw_chat(&self, body: &'static str) -> reqwest::Response {
        reqwest::Client::new()
            .post(&format!("{}/api/chat", &self.address))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

/// Launches the server as a background task, with fake backends
///
/// When a tokio runtime is shut down all tasks spawned on it are dropped.
/// tokio::test spins up a new runtime for each test case, so there is nothing to clean up.
pub async fn spawn_app(
    vector_index: FakeVectorIndex,
    completion: FakeCompletion,
) -> TestApp {
    Lazy::force(&TRACING);

    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration.");
        // Port 0 asks the OS for any available port
        c.application.port = 0;
        c.application.host = "127.0.0.1".into();
        c
    };

    let embedder = Arc::new(FakeEmbedder::default());
    let vector_index = Arc::new(vector_index);
    let completion = Arc::new(completion);

    let backends = Backends {
        embedder: embedder.clone(),
        vector_index: vector_index.clone(),
        completion_client: completion.clone(),
    };

    let application = Application::build_with_backends(&configuration, Some(1), backends)
        .expect("Failed to build application.");
    let application_port = application.port();

    let _ = tokio::spawn(application.run_until_stopped());

    TestApp {
        address: format!("http://127.0.0.1:{}", application_port),
        embedder,
        vector_index,
        completion,
    }
}

/// Serves `configure`'s routes on a random port, standing for an external API
pub fn spawn_mock_server(configure: fn(&mut web::ServiceConfig)) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind a random port");
    let port = listener.local_addr().unwrap().port();

    let server = HttpServer::new(move || App::new().configure(configure))
        .workers(1)
        .listen(listener)
        .expect("Failed to listen")
        .run();
    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

pub fn professor(id: &str, subject: &str, stars: f64) -> ProfessorMatch {
    ProfessorMatch {
        id: id.into(),
        score: Some(0.9),
        metadata: ProfessorMetadata {
            subject: Some(subject.into()),
            stars: Some(stars),
            review: Some(format!("{} explains things clearly", id)),
            ..Default::default()
        },
    }
}

/// Embeds every text as the same 384 dimensions vector and records the texts
#[derive(Default)]
pub struct FakeEmbedder {
    pub texts: Mutex<Vec<String>>,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
        self.texts.lock().unwrap().push(text.to_string());
        let mut embedding = vec![0.0; 384];
        embedding[0] = 1.0;
        Ok(embedding)
    }
}

pub struct FakeVectorIndex {
    matches: Vec<ProfessorMatch>,
    unavailable: bool,
    pub queries: Mutex<Vec<usize>>,
}

impl FakeVectorIndex {
    pub fn returning(matches: Vec<ProfessorMatch>) -> Self {
        Self {
            matches,
            unavailable: false,
            queries: Mutex::new(vec![]),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::returning(vec![])
        }
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn query(
        &self,
        _vector: &[f32],
        top_k: usize,
        _include_metadata: bool,
    ) -> Result<Vec<ProfessorMatch>, VectorIndexError> {
        self.queries.lock().unwrap().push(top_k);
        if self.unavailable {
            return Err(VectorIndexError::Unavailable(
                "simulated network failure".into(),
            ));
        }
        Ok(self.matches.clone())
    }
}

/// What the fake language model does once the completion is requested
pub enum ScriptStep {
    Fragment(&'static str),
    /// Lets the server flush what it received before the next step
    Pause(Duration),
    Fail(&'static str),
}

pub struct FakeCompletion {
    script: Mutex<Option<Vec<ScriptStep>>>,
    rejected: bool,
    pub requests: Mutex<Vec<Vec<Message>>>,
}

impl FakeCompletion {
    pub fn streaming(fragments: &[&'static str]) -> Self {
        Self::scripted(fragments.iter().map(|f| ScriptStep::Fragment(*f)).collect())
    }

    pub fn scripted(script: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            rejected: false,
            requests: Mutex::new(vec![]),
        }
    }

    /// Rejects the request as if the API key was invalid
    pub fn unauthorized() -> Self {
        Self {
            rejected: true,
            ..Self::scripted(vec![])
        }
    }

    pub fn last_request(&self) -> Vec<Message> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("No completion was requested")
    }
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(
        &self,
        messages: Vec<Message>,
    ) -> Result<FragmentStream, CompletionClientError> {
        self.requests.lock().unwrap().push(messages);
        if self.rejected {
            return Err(CompletionClientError::Unauthorized(
                "401 Unauthorized: invalid API key".into(),
            ));
        }

        let script = self.script.lock().unwrap().take().unwrap_or_default();
        let fragments = stream::iter(script)
            .filter_map(|step| async move {
                match step {
                    ScriptStep::Fragment(text) => Some(Ok(CompletionFragment::text(text))),
                    ScriptStep::Pause(duration) => {
                        tokio::time::sleep(duration).await;
                        None
                    }
                    ScriptStep::Fail(cause) => {
                        Some(Err(CompletionClientError::Interrupted(cause.into())))
                    }
                }
            })
            .boxed();

        Ok(fragments)
    }
}
