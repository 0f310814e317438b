// src/lib.rs

pub mod attempts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod routes;
pub mod settings;
pub mod state;
pub mod utils;

// Re-export specific items for convenience if needed
pub use routes::create_router;
