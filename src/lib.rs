// Core modules
pub mod api;
pub mod data;
pub mod execution;
pub mod models;
pub mod strategy;
pub mod trader;

// Re-export commonly used types
pub use api::*;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
