//! Domain layer - core types and error definitions.
//!
//! This layer contains pure domain models, configuration types, and error
//! types without any external dependencies (network, IO, etc.).

pub mod config;
pub mod error;
pub mod models;

pub use config::{Config, ExportConfig, IntercomConfig, OutputFormat, RetryConfig};
pub use error::{AppError, Result};
pub use models::{Author, AuthorKind, Conversation, ExportStats, Message};
