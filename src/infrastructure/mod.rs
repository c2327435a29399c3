//! Infrastructure layer - network and filesystem access.
//!
//! HTTP client for the Intercom API plus file readers for configuration
//! and id lists.

pub mod api_client;
pub mod config_file;
pub mod id_file;

pub use api_client::ApiClient;
pub use config_file::load_layer;
pub use id_file::{load_conversation_ids, DEFAULT_IDS_FILE};
