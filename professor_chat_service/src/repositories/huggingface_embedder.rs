use async_trait::async_trait;
use rust_bert::pipelines::sentence_embeddings::{
    SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
};
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::{
    configuration::{EmbeddingModelKind, EmbeddingSettings},
    domain::entities::embedding::{l2_normalize, Embedding},
    ports::embedder::{Embedder, EmbedderError},
};

/// Generates embeddings with a sentence embeddings model from Hugging Face.
///
/// Running the model is CPU-bound and the model cannot be moved between threads:
/// it is loaded and run on a dedicated runner thread. Requests are sent to the runner through a
/// bounded channel, and each one gets its embedding back through a oneshot channel.
pub struct HuggingFaceEmbedder {
    sender_to_runner: mpsc::Sender<RunnerMessage>,
    _thread_handle: JoinHandle<()>,
}

impl HuggingFaceEmbedder {
    /// Spawns the runner, which starts by loading the configured model.
    ///
    /// Requests sent while the model is loading wait for it.
    pub fn new(settings: &EmbeddingSettings) -> std::io::Result<Self> {
        let model = settings.model;
        let model_dir = settings.model_dir.clone();

        Self::spawn(settings.queue_capacity, settings.dimension, move || {
            load_model(model, model_dir)
        })
    }

    fn spawn<E, L>(queue_capacity: usize, dimension: usize, loader: L) -> std::io::Result<Self>
    where
        E: SentenceEncoder,
        L: FnOnce() -> Result<E, String> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let handle = thread::Builder::new()
            .name("embeddings-runner".into())
            .spawn(move || runner(loader, dimension, receiver))?;

        Ok(Self {
            sender_to_runner: sender,
            _thread_handle: handle,
        })
    }
}

/// A converted copy in `model_dir` takes precedence over the weights rust-bert downloads
fn load_model(
    model: EmbeddingModelKind,
    model_dir: Option<String>,
) -> Result<SentenceEmbeddingsModel, String> {
    let loaded = match (model_dir, pretrained_model_type(model)) {
        (Some(model_dir), _) => {
            info!(?model, %model_dir, "Loading embeddings model from disk");
            SentenceEmbeddingsBuilder::local(model_dir).create_model()
        }
        (None, Some(model_type)) => {
            info!(?model, "Downloading embeddings model");
            SentenceEmbeddingsBuilder::remote(model_type).create_model()
        }
        (None, None) => {
            return Err(format!(
                "{:?} can only be loaded from a converted copy: set `embedding.model_dir`",
                model
            ));
        }
    };

    loaded.map_err(|e| e.to_string())
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    #[tracing::instrument(name = "Embedding text", skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
        if text.trim().is_empty() {
            return Err(EmbedderError::EmptyInput);
        }

        let (sender, receiver) = oneshot::channel();

        self.sender_to_runner
            .send((text.to_string(), sender))
            .await
            .map_err(|_| EmbedderError::RunnerStopped)?;

        receiver.await.map_err(|_| EmbedderError::RunnerStopped)?
    }
}

/// The runner loop, on its own thread.
///
/// Once loaded, the model embeds a sample text to check it produces `dimension` values, as the
/// vector index rejects any other size.
/// If the model cannot be loaded or fails that check, the runner keeps answering every request
/// with the cause instead of stopping, so callers get it.
#[tracing::instrument(name = "Embeddings runner", skip(loader, receiver))]
fn runner<E, L>(loader: L, dimension: usize, mut receiver: mpsc::Receiver<RunnerMessage>)
where
    E: SentenceEncoder,
    L: FnOnce() -> Result<E, String>,
{
    let model = match loader().and_then(|model| check_output_dimension(model, dimension)) {
        Ok(model) => {
            info!("Embeddings model loaded ✅");
            model
        }
        Err(cause) => {
            error!(%cause, "Failed to load the embeddings model");
            while let Some((_, sender)) = receiver.blocking_recv() {
                let _ = sender.send(Err(EmbedderError::ModelUnavailable(cause.clone())));
            }
            return;
        }
    };

    while let Some((text, sender)) = receiver.blocking_recv() {
        let embedding = model
            .encode_one(&text)
            .map(l2_normalize)
            .map_err(EmbedderError::Inference);

        // The requester may have given up waiting
        let _ = sender.send(embedding);
    }

    info!("Embeddings runner stopped");
}

fn check_output_dimension<E: SentenceEncoder>(model: E, dimension: usize) -> Result<E, String> {
    let actual = model.encode_one("Who teaches algorithms well?")?.len();
    if actual != dimension {
        return Err(format!(
            "the model produces {} dimensions, `embedding.dimension` is {}",
            actual, dimension
        ));
    }
    Ok(model)
}

/// Message type for the runner channel: the text to embed, and where to send its embedding
type RunnerMessage = (String, oneshot::Sender<Result<Embedding, EmbedderError>>);

/// What the runner needs from a model
trait SentenceEncoder {
    fn encode_one(&self, text: &str) -> Result<Embedding, String>;
}

impl SentenceEncoder for SentenceEmbeddingsModel {
    fn encode_one(&self, text: &str) -> Result<Embedding, String> {
        self.encode(&[text])
            .map_err(|e| e.to_string())?
            .pop()
            .ok_or_else(|| "the model returned no embedding".to_string())
    }
}

/// The rust-bert model to download for `kind`, if rust-bert hosts one
fn pretrained_model_type(kind: EmbeddingModelKind) -> Option<SentenceEmbeddingsModelType> {
    let model_type = match kind {
        EmbeddingModelKind::GteSmall => return None,
        EmbeddingModelKind::AllMiniLmL12V2 => SentenceEmbeddingsModelType::AllMiniLmL12V2,
        EmbeddingModelKind::AllMiniLmL6V2 => SentenceEmbeddingsModelType::AllMiniLmL6V2,
        EmbeddingModelKind::AllDistilrobertaV1 => SentenceEmbeddingsModelType::AllDistilrobertaV1,
        EmbeddingModelKind::ParaphraseAlbertSmallV2 => {
            SentenceEmbeddingsModelType::ParaphraseAlbertSmallV2
        }
        EmbeddingModelKind::SentenceT5Base => SentenceEmbeddingsModelType::SentenceT5Base,
        EmbeddingModelKind::DistiluseBaseMultilingualCased => {
            SentenceEmbeddingsModelType::DistiluseBaseMultilingualCased
        }
        EmbeddingModelKind::BertBaseNliMeanTokens => {
            SentenceEmbeddingsModelType::BertBaseNliMeanTokens
        }
    };
    Some(model_type)
}
