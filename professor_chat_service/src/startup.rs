use actix_web::{
    dev::Server,
    web::{self, Data},
    App, HttpServer,
};
use std::{net::TcpListener, sync::Arc};
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::{
    configuration::{Settings, VectorIndexBackend},
    ports::{completion_client::CompletionClient, embedder::Embedder, vector_index::VectorIndex},
    repositories::{
        completion_groq_repository::CompletionGroqRepository,
        huggingface_embedder::HuggingFaceEmbedder,
        professor_pinecone_repository::ProfessorPineconeRepository,
        professor_qdrant_repository::{ProfessorQdrantRepository, ProfessorQdrantRepositoryError},
    },
    routes::{chat, chat_json_error_handler, health_check},
    use_cases::answer_question::AnswerQuestionUseCase,
};

/// Holds the newly built server, and some useful properties
pub struct Application {
    server: Server,
    port: u16,
}

/// The external services answering a question depends on.
///
/// Built from the settings by `Application::build`; integration tests provide fakes instead.
#[derive(Clone)]
pub struct Backends {
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub completion_client: Arc<dyn CompletionClient>,
}

impl Backends {
    /// The embeddings model starts loading in the background: the server does not wait for it
    #[tracing::instrument(name = "Setting up backends", skip(settings))]
    pub fn from_settings(settings: &Settings) -> Result<Self, ApplicationBuildError> {
        let http_client = reqwest::Client::builder().build()?;

        let embedder = HuggingFaceEmbedder::new(&settings.embedding)?;

        let vector_index: Arc<dyn VectorIndex> = match settings.vector_index.backend {
            VectorIndexBackend::Pinecone => Arc::new(ProfessorPineconeRepository::new(
                http_client.clone(),
                &settings.vector_index,
                settings.embedding.dimension,
            )),
            VectorIndexBackend::Qdrant => Arc::new(ProfessorQdrantRepository::try_new(
                &settings.vector_index,
                settings.embedding.dimension,
            )?),
        };
        info!(
            backend = ?settings.vector_index.backend,
            index = settings.vector_index.index_name,
            namespace = settings.vector_index.namespace,
            "Vector index configured"
        );

        let completion_client =
            CompletionGroqRepository::new(http_client, &settings.completion);

        Ok(Self {
            embedder: Arc::new(embedder),
            vector_index,
            completion_client: Arc::new(completion_client),
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApplicationBuildError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),
    #[error(transparent)]
    QdrantError(#[from] ProfessorQdrantRepositoryError),
}

impl Application {
    /// # Parameters
    /// - nb_workers: number of actix-web workers
    ///   if `None`, the number of available physical CPUs is used as the worker count.
    #[tracing::instrument(name = "Building application")]
    pub async fn build(
        settings: Settings,
        nb_workers: Option<usize>,
    ) -> Result<Self, ApplicationBuildError> {
        let backends = Backends::from_settings(&settings)?;
        Self::build_with_backends(&settings, nb_workers, backends)
    }

    /// Builds the server on top of already set up backends
    pub fn build_with_backends(
        settings: &Settings,
        nb_workers: Option<usize>,
        backends: Backends,
    ) -> Result<Self, ApplicationBuildError> {
        let address = format!(
            "{}:{}",
            settings.application.host, settings.application.port
        );
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let answer_question = AnswerQuestionUseCase::new(
            backends.embedder,
            backends.vector_index,
            backends.completion_client,
            settings.vector_index.top_k,
        );

        let server = run(listener, nb_workers, answer_question)?;

        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// This function only returns when the application is stopped
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        info!(port = self.port, "Running server ...");
        self.server.await
    }
}

/// listener: the consumer binds their own port
///
/// TracingLogger middleware: generates a `request_id` for each incoming request,
/// attached to every log of the request, including the ones emitted while streaming the answer.
pub fn run(
    listener: TcpListener,
    nb_workers: Option<usize>,
    answer_question: AnswerQuestionUseCase,
) -> Result<Server, std::io::Error> {
    // Shared by all workers, the use case only holds read-only clients
    let answer_question = Data::new(answer_question);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::resource("/api/chat")
                    .app_data(
                        web::JsonConfig::default()
                            // Bodies are parsed as JSON whatever their Content-Type
                            .content_type_required(false)
                            .error_handler(chat_json_error_handler),
                    )
                    .route(web::post().to(chat)),
            )
            .app_data(answer_question.clone())
    })
    .listen(listener)?;

    if let Some(nb_workers) = nb_workers {
        return Ok(server.workers(nb_workers).run());
    }

    Ok(server.run())
}
