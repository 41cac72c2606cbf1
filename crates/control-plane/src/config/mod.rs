//! Configuration loading from environment variables.
//!
//! Uses `envy` for type-safe environment variable parsing.

mod app;
mod database;

pub use app::AppConfig;
pub use database::DatabaseConfig;
