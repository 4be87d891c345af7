//! Advisory cache-aside layer for bbox catalogue queries (spec §4.3), reusing the same
//! Redis client as the task broker. Fail-open: every operation swallows its own errors
//! and logs them — a cache miss (real or from a broken connection) just means "ask
//! Postgres instead," it never surfaces to the caller.

use std::time::Duration;

use redis::{aio::ConnectionManager, AsyncCommands};

use crate::ids::BuildingId;
use crate::service::building::BoundingBox;

#[derive(Clone)]
pub struct QueryCache {
    manager: Option<ConnectionManager>,
    ttl_seconds: u64,
}

impl QueryCache {
    #[must_use]
    pub fn new(manager: ConnectionManager, enabled: bool, ttl: Duration) -> Self {
        Self {
            manager: enabled.then_some(manager),
            ttl_seconds: ttl.as_secs().max(1),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            manager: None,
            ttl_seconds: 1,
        }
    }

    fn key(bbox: Option<BoundingBox>, limit: i64, cursor: Option<BuildingId>) -> String {
        let bbox_part = bbox.map_or_else(
            || "all".to_string(),
            |b| format!("{:.6},{:.6},{:.6},{:.6}", b.min_lon, b.min_lat, b.max_lon, b.max_lat),
        );
        let cursor_part = cursor.map_or_else(String::new, |c| c.to_string());
        format!("buildings:bbox:{bbox_part}:{limit}:{cursor_part}")
    }

    /// Returns the cached `(body, etag)` pair for this exact page, if present.
    pub async fn get(
        &self,
        bbox: Option<BoundingBox>,
        limit: i64,
        cursor: Option<BuildingId>,
    ) -> Option<(String, String)> {
        let mut manager = self.manager.clone()?;
        let key = Self::key(bbox, limit, cursor);

        match manager.get::<_, Option<String>>(&key).await {
            Ok(Some(raw)) => raw.split_once('\n').map(|(etag, body)| (body.to_string(), etag.to_string())),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, %key, "query cache get failed");
                None
            }
        }
    }

    pub async fn set(&self, bbox: Option<BoundingBox>, limit: i64, cursor: Option<BuildingId>, body: &str, etag: &str) {
        let Some(mut manager) = self.manager.clone() else {
            return;
        };
        let key = Self::key(bbox, limit, cursor);
        let payload = format!("{etag}\n{body}");

        if let Err(err) = manager.set_ex::<_, _, ()>(&key, payload, self.ttl_seconds).await {
            tracing::warn!(error = %err, %key, "query cache set failed");
        }
    }

    /// Drops every cached bbox page. Called on any building mutation (spec §4.3
    /// cascade delete): a deleted building can appear on many different bbox/cursor
    /// pages, so targeted per-key invalidation can't reliably find them all.
    pub async fn invalidate_all(&self) {
        let Some(mut manager) = self.manager.clone() else {
            return;
        };

        let keys: Result<Vec<String>, _> = manager.keys("buildings:bbox:*").await;
        match keys {
            Ok(keys) if !keys.is_empty() => {
                if let Err(err) = manager.del::<_, ()>(keys).await {
                    tracing::warn!(error = %err, "query cache invalidation failed");
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "query cache key scan failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_differs_by_bbox_limit_and_cursor() {
        let bbox = BoundingBox::parse("12.4,41.8,12.6,42.0").unwrap();
        let a = QueryCache::key(Some(bbox), 100, None);
        let b = QueryCache::key(None, 100, None);
        let c = QueryCache::key(Some(bbox), 50, None);
        let d = QueryCache::key(Some(bbox), 100, Some(BuildingId::new()));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn key_is_stable_for_identical_inputs() {
        let bbox = BoundingBox::parse("12.4,41.8,12.6,42.0").unwrap();
        assert_eq!(QueryCache::key(Some(bbox), 100, None), QueryCache::key(Some(bbox), 100, None));
    }
}
