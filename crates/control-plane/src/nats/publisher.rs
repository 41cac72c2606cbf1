//! NATS JetStream publishers for workflow events and execution requests.
//!
//! Architecture:
//! - Workflow events go to `sqlgate.workflow.events` for mail/IM relays
//! - Execution requests go to `sqlgate.tasks.execute` for the SQL executor
//! - Both subjects live in one stream so relays can replay recent history

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::engine::ports::{DispatchRequest, Notifier, TaskExecutor, WorkflowEvent};
use crate::error::{AppError, AppResult};

/// Default subject for workflow events.
pub const DEFAULT_EVENT_SUBJECT: &str = "sqlgate.workflow.events";

/// Default subject for execution requests.
pub const DEFAULT_DISPATCH_SUBJECT: &str = "sqlgate.tasks.execute";

/// Default JetStream stream name.
pub const DEFAULT_STREAM: &str = "sqlgate";

/// Errors that can occur during NATS operations.
#[derive(Debug, Error)]
pub enum NatsError {
    #[error("JetStream error: {0}")]
    JetStream(String),

    #[error("Publish error: {0}")]
    Publish(String),
}

impl From<NatsError> for AppError {
    fn from(err: NatsError) -> Self {
        AppError::Nats(err.to_string())
    }
}

/// JetStream publisher shared by the notifier and the dispatcher.
#[derive(Clone)]
pub struct NatsPublisher {
    js: Context,
}

impl NatsPublisher {
    /// Create a publisher and make sure `stream_name` captures `subjects`.
    pub async fn new(
        client: Arc<async_nats::Client>,
        stream_name: Option<&str>,
        subjects: &[&str],
    ) -> Result<Self, NatsError> {
        let stream = stream_name.unwrap_or(DEFAULT_STREAM);
        let js = jetstream::new((*client).clone());

        Self::ensure_stream(&js, stream, subjects).await?;

        Ok(Self { js })
    }

    /// Ensure the JetStream stream exists.
    async fn ensure_stream(js: &Context, stream: &str, subjects: &[&str]) -> Result<(), NatsError> {
        match js.get_stream(stream).await {
            Ok(_) => {
                tracing::debug!(stream = %stream, "Using existing NATS stream");
                Ok(())
            }
            Err(_) => {
                let config = jetstream::stream::Config {
                    name: stream.to_string(),
                    subjects: subjects.iter().map(|s| s.to_string()).collect(),
                    max_age: std::time::Duration::from_secs(24 * 3600),
                    storage: jetstream::stream::StorageType::File,
                    ..Default::default()
                };

                js.create_stream(config)
                    .await
                    .map_err(|e| NatsError::JetStream(e.to_string()))?;

                tracing::info!(stream = %stream, subjects = ?subjects, "Created NATS stream");
                Ok(())
            }
        }
    }

    /// Publish a JSON payload and wait for the stream acknowledgement.
    pub async fn publish_json<T: Serialize>(&self, subject: &str, value: &T) -> Result<(), NatsError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| NatsError::Publish(format!("Serialization error: {}", e)))?;

        self.js
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| NatsError::Publish(e.to_string()))?
            .await
            .map_err(|e| NatsError::Publish(e.to_string()))?;

        Ok(())
    }
}

/// Publishes workflow events for downstream notification relays.
#[derive(Clone)]
pub struct NatsNotifier {
    publisher: NatsPublisher,
    subject: String,
}

impl NatsNotifier {
    pub fn new(publisher: NatsPublisher, subject: impl Into<String>) -> Self {
        Self {
            publisher,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, event: &WorkflowEvent) -> AppResult<()> {
        self.publisher.publish_json(&self.subject, event).await?;

        tracing::debug!(
            workflow_id = %event.workflow_id,
            kind = %event.kind,
            "Published workflow event"
        );
        Ok(())
    }
}

/// Hands execution requests to the SQL executor over JetStream.
#[derive(Clone)]
pub struct NatsTaskDispatcher {
    publisher: NatsPublisher,
    subject: String,
}

impl NatsTaskDispatcher {
    pub fn new(publisher: NatsPublisher, subject: impl Into<String>) -> Self {
        Self {
            publisher,
            subject: subject.into(),
        }
    }
}

#[async_trait]
impl TaskExecutor for NatsTaskDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> AppResult<()> {
        self.publisher.publish_json(&self.subject, request).await?;

        tracing::debug!(
            workflow_id = %request.workflow_id,
            task_id = request.task_id,
            scheduled = request.scheduled,
            "Published execution request"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::WorkflowEventKind;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_dispatch_request_payload() {
        let request = DispatchRequest {
            workflow_id: Uuid::new_v4(),
            record_id: Uuid::new_v4(),
            task_id: 42,
            triggered_by: "u2".to_string(),
            scheduled: true,
        };

        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["task_id"], 42);
        assert_eq!(json["triggered_by"], "u2");
        assert_eq!(json["scheduled"], true);
    }

    #[test]
    fn test_event_payload_uses_snake_case_kind() {
        let event = WorkflowEvent {
            workflow_id: Uuid::new_v4(),
            kind: WorkflowEventKind::ExecutionDispatched,
            subject: "S1".to_string(),
            task_id: 1,
            actor: "u2".to_string(),
            at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""kind":"execution_dispatched""#));
    }

    #[test]
    fn test_nats_error_maps_to_app_error() {
        let err: AppError = NatsError::Publish("no responders".to_string()).into();
        assert!(matches!(err, AppError::Nats(_)));
    }

    #[test]
    fn test_default_subjects() {
        assert_eq!(DEFAULT_EVENT_SUBJECT, "sqlgate.workflow.events");
        assert_eq!(DEFAULT_DISPATCH_SUBJECT, "sqlgate.tasks.execute");
    }
}
