//! NATS JetStream integration for the SQLGate control plane.
//!
//! Publishes workflow events and execution requests. Optional: without a
//! NATS URL the server logs events and queues dispatches in Postgres.

pub mod publisher;

pub use publisher::{NatsNotifier, NatsPublisher, NatsTaskDispatcher};
