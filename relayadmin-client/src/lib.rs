pub mod api;
pub mod config;
pub mod render;
pub mod session;
pub mod token_store;

pub use api::{AdminClient, AdminClientBuilder, ApiError, CredentialProvider};
pub use session::{LoginHint, Navigator, Session, bootstrap};
pub use token_store::{JsonFileStore, KeyValueStore, MemoryStore, TokenStore};
