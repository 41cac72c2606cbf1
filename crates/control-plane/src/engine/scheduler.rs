//! Background trigger for scheduled executions.
//!
//! Each tick asks the store for records whose schedule has come due and
//! fires them through [`WorkflowEngine::fire_scheduled`]. Firing uses the
//! same version-checked claim as a manual execute, so overlapping ticks,
//! several control-plane replicas or a racing user can never dispatch the
//! same record twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::engine::orchestrator::WorkflowEngine;
use crate::error::AppResult;

/// Periodic scheduled-execution trigger.
#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<WorkflowEngine>,
    interval: Duration,
    batch_size: i64,
}

impl Scheduler {
    pub fn new(engine: Arc<WorkflowEngine>, interval: Duration, batch_size: i64) -> Self {
        Self {
            engine,
            interval,
            batch_size: batch_size.max(1),
        }
    }

    /// Fire every record due at `now`. Returns how many were dispatched.
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let due = self.engine.due_for_execution(now, self.batch_size).await?;
        let mut fired = 0;

        for workflow_id in due {
            match self.engine.fire_scheduled(workflow_id, now).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow_id,
                        error = %e,
                        "Scheduled execution skipped"
                    );
                }
            }
        }

        Ok(fired)
    }

    /// Run ticks forever.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Scheduler started"
        );

        loop {
            ticker.tick().await;

            match self.tick(Utc::now()).await {
                Ok(0) => tracing::trace!("Scheduler tick, nothing due"),
                Ok(fired) => tracing::info!(fired, "Scheduled executions dispatched"),
                Err(e) => tracing::warn!(error = %e, "Scheduler tick failed"),
            }
        }
    }

    /// Start the scheduler as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::RecordStatus;
    use crate::engine::testing::{Harness, INSTANCE_TWO_STEP};
    use crate::error::AppError;
    use chrono::Duration as ChronoDuration;

    async fn scheduled_workflow(h: &Harness, task_id: i64, at: DateTime<Utc>) -> uuid::Uuid {
        h.add_task(task_id, INSTANCE_TWO_STEP, "owner");
        let workflow = h
            .engine
            .create("owner", h.create_request(&format!("S{}", task_id), task_id))
            .await
            .unwrap();
        let step1 = workflow.record.steps[0].id;
        h.engine.approve(workflow.id, step1, "u1").await.unwrap();
        h.engine.schedule(workflow.id, "u2", Some(at)).await.unwrap();
        workflow.id
    }

    #[tokio::test]
    async fn test_tick_fires_due_records_once() {
        let h = Harness::new();
        let at = Utc::now() + ChronoDuration::minutes(10);
        let first = scheduled_workflow(&h, 1, at).await;
        let second = scheduled_workflow(&h, 2, at + ChronoDuration::hours(1)).await;
        let scheduler = Scheduler::new(h.engine.clone(), Duration::from_secs(1), 10);

        assert_eq!(scheduler.tick(Utc::now()).await.unwrap(), 0);
        assert_eq!(scheduler.tick(at).await.unwrap(), 1);
        assert_eq!(scheduler.tick(at).await.unwrap(), 0);

        let requests = h.executor.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].workflow_id, first);

        let pending = h.engine.get(second).await.unwrap();
        assert_eq!(pending.record.status, RecordStatus::Running);
        assert!(pending.record.scheduled_at.is_some());
    }

    #[tokio::test]
    async fn test_overlapping_ticks_dispatch_once() {
        let h = Harness::new();
        let at = Utc::now() + ChronoDuration::minutes(10);
        scheduled_workflow(&h, 1, at).await;
        let a = Scheduler::new(h.engine.clone(), Duration::from_secs(1), 10);
        let b = a.clone();

        let (fired_a, fired_b) = tokio::join!(a.tick(at), b.tick(at));
        assert_eq!(fired_a.unwrap() + fired_b.unwrap(), 1);
        assert_eq!(h.store.conflicts(), 1);
        assert_eq!(h.executor.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_tick_and_unschedule_race() {
        let h = Harness::new();
        let at = Utc::now() + ChronoDuration::minutes(10);
        let workflow_id = scheduled_workflow(&h, 1, at).await;
        let scheduler = Scheduler::new(h.engine.clone(), Duration::from_secs(1), 10);

        // A manual execute never competes with a pending schedule.
        assert!(matches!(
            h.engine.execute(workflow_id, "u2").await,
            Err(AppError::InvalidState(_))
        ));

        let (fired, unscheduled) = tokio::join!(
            scheduler.tick(at),
            h.engine.schedule(workflow_id, "u2", None)
        );
        assert_eq!(fired.unwrap(), 1);
        assert!(matches!(unscheduled, Err(AppError::Conflict(_))));
        assert_eq!(h.store.conflicts(), 1);
        assert_eq!(h.executor.requests().len(), 1);

        let stored = h.engine.get(workflow_id).await.unwrap();
        assert_eq!(stored.record.status, RecordStatus::Finished);
    }

    #[tokio::test]
    async fn test_unscheduled_record_is_not_fired() {
        let h = Harness::new();
        let at = Utc::now() + ChronoDuration::minutes(10);
        let workflow_id = scheduled_workflow(&h, 1, at).await;
        h.engine.schedule(workflow_id, "u2", None).await.unwrap();

        let scheduler = Scheduler::new(h.engine.clone(), Duration::from_secs(1), 10);
        assert_eq!(scheduler.tick(at).await.unwrap(), 0);
        assert!(h.executor.requests().is_empty());
    }
}
