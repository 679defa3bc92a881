pub mod analytics;
pub mod auth;
pub mod error;
pub mod flash;
pub mod models;
pub mod repo;
pub mod routes;
pub mod security;
pub mod slug;
pub mod templates;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
