pub mod chat;
pub mod health_check;

pub use chat::*;
pub use health_check::*;
