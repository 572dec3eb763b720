pub mod context_formatter;
pub mod prompt;
pub mod stream_relay;
