//! Task dispatch over a Redis-style broker speaking the Celery v2 JSON protocol
//! (spec §4.4).

pub mod celery;
pub mod redis_broker;

pub use celery::{TaskResult, TaskState};
pub use redis_broker::RedisBroker;

use uuid::Uuid;

#[async_trait::async_trait]
pub trait TaskBroker: Send + Sync {
    /// Enqueue a processing task for `ifc_file_id`/`s3_key`, returning the Celery task id.
    async fn enqueue_ifc_processing(
        &self,
        ifc_file_id: Uuid,
        s3_key: &str,
    ) -> anyhow::Result<Uuid>;

    /// Fetch the current result, or `None` if no result key exists yet (still `PENDING`
    /// in the sense that the worker hasn't written a status at all).
    async fn task_result(&self, task_id: Uuid) -> anyhow::Result<Option<TaskResult>>;

    /// Cheap liveness probe used by the health endpoint (spec §9 resolution: a bounded
    /// `PING` with no broker detail surfaced to the client).
    async fn ping(&self) -> anyhow::Result<()>;

    /// Enqueues a health-check task and polls for its result up to ten times at 500 ms
    /// intervals (spec §4.4 "Health probe"), bounding total wait to 5s. Returns `true`
    /// only if a `SUCCESS` result was observed within that window.
    async fn probe_worker_health(&self) -> bool;
}
