//! Database module for the SQLGate control plane.
//!
//! Connectivity, schema setup, row models and the Postgres-backed
//! implementations of the engine's store and collaborator traits.

pub mod models;
pub mod pool;
pub mod queries;
pub mod schema;

pub use pool::{create_pool, health_check, DbPool};
pub use queries::{
    PgDispatchQueue, PgPermissionOracle, PgTaskProvider, PgTemplateProvider, PgWorkflowStore,
};
pub use schema::init_schema;
