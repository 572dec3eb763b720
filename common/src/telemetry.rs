use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing::Subscriber;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::{log_tracer::SetLoggerError, LogTracer};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

/// Builds the `tracing` subscriber shared by our services.
///
/// Layers, from the outermost:
/// - an `EnvFilter` read from `RUST_LOG`, or built from `fallback_env_filter` when unset
/// - `JsonStorageLayer`, which keeps span fields so children can inherit them
/// - a bunyan JSON formatter writing to `sink`
///
/// The sink is generic so tests can swap stdout for `std::io::sink` or an in-memory buffer.
pub fn get_tracing_subscriber<Sink>(
    name: impl Into<String>,
    fallback_env_filter: impl AsRef<str>,
    sink: Sink,
) -> impl Subscriber + Send + Sync
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_env_filter.as_ref()));

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(name.into(), sink))
}

/// Installs `subscriber` as the process-wide default and redirects `log` records to it.
///
/// Fails if a logger or a subscriber was already installed, so it should be called once,
/// at the very start of `main`.
pub fn init_tracing_subscriber(
    subscriber: impl Subscriber + Send + Sync + 'static,
) -> Result<(), TelemetryError> {
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("a `log` logger was already installed: {0}")]
    Logger(#[from] SetLoggerError),
    #[error("a tracing subscriber was already installed: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}
