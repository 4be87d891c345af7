use std::time::Duration;

use redis::{aio::ConnectionManager, AsyncCommands};
use uuid::Uuid;

use super::celery::{self, TaskResult, TaskState, HEALTH_CHECK_TASK, IFC_PROCESSING_TASK, QUEUE_NAME};
use super::TaskBroker;
use crate::config::DynAppConfig;

const HEALTH_PROBE_ATTEMPTS: u32 = 10;
const HEALTH_PROBE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct RedisBroker {
    manager: ConnectionManager,
}

impl RedisBroker {
    /// Connect with a capped backoff: `min(attempt * 50ms, 2s)`, up to
    /// `broker_reconnect_max_retries` attempts, before giving up.
    pub async fn connect(config: &DynAppConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(config.broker_url.as_str())?;

        let mut attempt = 0u32;
        loop {
            match client.get_connection_manager().await {
                Ok(manager) => return Ok(Self { manager }),
                Err(err) if attempt < config.broker_reconnect_max_retries => {
                    attempt += 1;
                    let backoff = Duration::from_millis(u64::from(attempt) * 50).min(Duration::from_secs(2));
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "broker connection failed, retrying in {backoff:?}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return Err(anyhow::anyhow!(
                        "failed to connect to broker after {attempt} retries: {err}"
                    ))
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl TaskBroker for RedisBroker {
    async fn enqueue_ifc_processing(
        &self,
        ifc_file_id: Uuid,
        s3_key: &str,
    ) -> anyhow::Result<Uuid> {
        let envelope = celery::build_envelope(
            IFC_PROCESSING_TASK,
            vec![
                serde_json::Value::String(ifc_file_id.to_string()),
                serde_json::Value::String(s3_key.to_string()),
            ],
        );
        let task_id = self.push_envelope(envelope).await?;
        tracing::info!(%task_id, %ifc_file_id, "enqueued ifc processing task");
        Ok(task_id)
    }

    async fn task_result(&self, task_id: Uuid) -> anyhow::Result<Option<TaskResult>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(celery::result_key(task_id)).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    /// Bounded probe: a single `PING` with the client's own connect/command timeout
    /// doing the bounding (spec §9 resolution: health degrades, never discloses detail).
    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn probe_worker_health(&self) -> bool {
        let envelope = celery::build_envelope(HEALTH_CHECK_TASK, Vec::new());
        let task_id = match self.push_envelope(envelope).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(error = %err, "failed to enqueue worker health-check task");
                return false;
            }
        };

        for _ in 0..HEALTH_PROBE_ATTEMPTS {
            tokio::time::sleep(HEALTH_PROBE_INTERVAL).await;
            match self.task_result(task_id).await {
                Ok(Some(result)) if result.status == TaskState::Success => return true,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to poll worker health-check result");
                    return false;
                }
            }
        }
        false
    }
}

impl RedisBroker {
    /// Exposes the broker's own connection manager so other components (the query
    /// cache) can reuse the same Redis client instead of opening a second one.
    #[must_use]
    pub fn connection_manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Pushes the envelope onto the work queue and nothing else. The core never writes
    /// to a `celery-task-meta-*` result key — only the worker does — so a task has no
    /// result entry at all until the worker picks it up and reports one; `task_result`
    /// treats a missing key as `PENDING` for exactly this reason.
    async fn push_envelope(&self, envelope: celery::Envelope) -> anyhow::Result<Uuid> {
        let task_id = celery::task_id_of(&envelope);
        let payload = serde_json::to_string(&envelope)?;

        let mut conn = self.manager.clone();
        let () = conn.lpush(QUEUE_NAME, payload).await?;

        Ok(task_id)
    }
}
