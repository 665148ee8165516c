// Adapters layer: concrete implementations for external systems (http, credentials).

pub mod credentials;
pub mod http;

pub use credentials::{authorize, FileCredentialStore, StaticToken};
pub use http::ApiClient;
