//! Persistence for `IfcFile` rows: the two-phase upload state machine plus the
//! single-file replacement sweep.

use super::dbutils::DbErrorHandler;
use super::PostgresCatalog;
use crate::error::{ApiError, Result};
use crate::ids::IfcFileId;
use crate::service::ifc_file::{IfcFile, ProcessingStatus, UploadStatus};

#[derive(sqlx::FromRow)]
struct IfcFileRow {
    id: IfcFileId,
    file_name: String,
    file_size: i64,
    s3_key: String,
    upload_status: UploadStatus,
    processing_status: ProcessingStatus,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    uploaded_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<IfcFileRow> for IfcFile {
    fn from(row: IfcFileRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            file_size: row.file_size,
            s3_key: row.s3_key,
            upload_status: row.upload_status,
            processing_status: row.processing_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            uploaded_at: row.uploaded_at,
        }
    }
}

impl PostgresCatalog {
    /// Insert a new `pending` `IfcFile`. When `single_file_replacement_policy` is
    /// enabled, every non-deleted row is swept to `deleted` first, in the same
    /// transaction, so the sweep and the insert are atomic (spec §9 resolution #1).
    ///
    /// Returns the new row alongside the `s3_key`s of any rows the sweep just replaced,
    /// so the caller can issue best-effort object-storage deletes for them (spec §4.2
    /// effect 1) — this function only owns the Postgres side of that effect.
    pub async fn create_pending_ifc_file(
        &self,
        file_name: &str,
        file_size: i64,
        s3_key: &str,
        single_file_replacement_policy: bool,
    ) -> Result<(IfcFile, Vec<String>)> {
        let mut tx = self.pool().begin().await.map_err(DbErrorHandler::into_api_error)?;

        let replaced_s3_keys = if single_file_replacement_policy {
            sqlx::query_scalar::<_, String>(
                r"
                UPDATE ifc_files
                SET upload_status = 'deleted', updated_at = now()
                WHERE upload_status != 'deleted'
                RETURNING s3_key
                ",
            )
            .fetch_all(&mut *tx)
            .await
            .map_err(DbErrorHandler::into_api_error)?
        } else {
            Vec::new()
        };

        let row = sqlx::query_as::<_, IfcFileRow>(
            r"
            INSERT INTO ifc_files (id, file_name, file_size, s3_key, upload_status, processing_status)
            VALUES (gen_random_uuid(), $1, $2, $3, 'pending', 'not_started')
            RETURNING id, file_name, file_size, s3_key, upload_status, processing_status,
                      created_at, updated_at, uploaded_at
            ",
        )
        .bind(file_name)
        .bind(file_size)
        .bind(s3_key)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_error) if db_error.is_unique_violation() => {
                ApiError::bad_request("An object with this storage key already exists")
            }
            other => DbErrorHandler::into_api_error(other),
        })?;

        tx.commit().await.map_err(DbErrorHandler::into_api_error)?;

        Ok((row.into(), replaced_s3_keys))
    }

    pub async fn get_ifc_file(&self, id: IfcFileId) -> Result<Option<IfcFile>> {
        let row = sqlx::query_as::<_, IfcFileRow>(
            r"
            SELECT id, file_name, file_size, s3_key, upload_status, processing_status,
                   created_at, updated_at, uploaded_at
            FROM ifc_files
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(DbErrorHandler::into_api_error)?;

        Ok(row.map(Into::into))
    }

    /// Confirm an upload: `upload_status -> completed`, stamp `uploaded_at`, and
    /// (only when the row hasn't already started processing) advance
    /// `processing_status -> processing`. The caller must have verified the object
    /// exists in storage first and must commit this before enqueuing the processing
    /// task (spec §4.2 / §7 ordering invariant).
    ///
    /// Returns `true` when this call is the one that transitioned the row into
    /// `processing` (i.e. the caller should enqueue a task); `false` when the row had
    /// already left `not_started`, so a second enqueue would be a duplicate.
    pub async fn complete_ifc_file(&self, id: IfcFileId) -> Result<(IfcFile, bool)> {
        let mut tx = self.pool().begin().await.map_err(DbErrorHandler::into_api_error)?;

        let existing = sqlx::query_as::<_, IfcFileRow>(
            "SELECT id, file_name, file_size, s3_key, upload_status, processing_status, created_at, updated_at, uploaded_at FROM ifc_files WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbErrorHandler::into_api_error)?
        .ok_or_else(|| ApiError::not_found("IfcFile not found"))?;

        let should_enqueue = existing.processing_status == ProcessingStatus::NotStarted;
        let next_processing_status = if should_enqueue {
            ProcessingStatus::Processing
        } else {
            existing.processing_status
        };

        let row = sqlx::query_as::<_, IfcFileRow>(
            r"
            UPDATE ifc_files
            SET upload_status = 'completed',
                processing_status = $2,
                uploaded_at = now(),
                updated_at = now()
            WHERE id = $1
            RETURNING id, file_name, file_size, s3_key, upload_status, processing_status,
                      created_at, updated_at, uploaded_at
            ",
        )
        .bind(id)
        .bind(next_processing_status)
        .fetch_one(&mut *tx)
        .await
        .map_err(DbErrorHandler::into_api_error)?;

        tx.commit().await.map_err(DbErrorHandler::into_api_error)?;

        Ok((row.into(), should_enqueue))
    }

    /// Delete the `IfcFile` row outright; used by the building cascade-delete path
    /// (spec §4.3 `DELETE /buildings/{id}`). Returns the deleted row's `s3_key` so the
    /// caller can issue a best-effort object-storage delete.
    pub async fn delete_ifc_file(&self, id: IfcFileId) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("DELETE FROM ifc_files WHERE id = $1 RETURNING s3_key")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbErrorHandler::into_api_error)?;

        Ok(row.map(|(key,)| key))
    }
}

#[cfg(test)]
mod tests {
    use super::super::PostgresCatalog;

    #[sqlx::test]
    async fn create_then_complete_transitions_exactly_once(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };

        let (file, replaced) = catalog
            .create_pending_ifc_file("model.ifc", 1024, "1700000000000-abc123-model.ifc", false)
            .await
            .unwrap();
        assert!(replaced.is_empty());
        assert_eq!(file.upload_status.to_string(), "pending");
        assert_eq!(file.processing_status.to_string(), "not_started");

        let (completed, should_enqueue) = catalog.complete_ifc_file(file.id).await.unwrap();
        assert!(should_enqueue);
        assert_eq!(completed.upload_status.to_string(), "completed");
        assert_eq!(completed.processing_status.to_string(), "processing");

        let (completed_again, should_enqueue_again) =
            catalog.complete_ifc_file(file.id).await.unwrap();
        assert!(!should_enqueue_again);
        assert_eq!(completed_again.processing_status.to_string(), "processing");
    }

    #[sqlx::test]
    async fn replacement_policy_sweeps_prior_rows(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };

        let (first, first_replaced) = catalog
            .create_pending_ifc_file("a.ifc", 10, "1700000000000-aaaaaaaaaa-a.ifc", true)
            .await
            .unwrap();
        assert!(first_replaced.is_empty());
        let (second, second_replaced) = catalog
            .create_pending_ifc_file("b.ifc", 10, "1700000000001-bbbbbbbbbb-b.ifc", true)
            .await
            .unwrap();
        assert_eq!(second_replaced, vec!["1700000000000-aaaaaaaaaa-a.ifc".to_string()]);

        let first_reloaded = catalog.get_ifc_file(first.id).await.unwrap().unwrap();
        assert_eq!(first_reloaded.upload_status.to_string(), "deleted");

        let second_reloaded = catalog.get_ifc_file(second.id).await.unwrap().unwrap();
        assert_eq!(second_reloaded.upload_status.to_string(), "pending");
    }

    #[sqlx::test]
    async fn duplicate_s3_key_is_rejected_as_bad_request(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };

        catalog
            .create_pending_ifc_file("a.ifc", 10, "1700000000000-aaaaaaaaaa-a.ifc", false)
            .await
            .unwrap();

        let err = catalog
            .create_pending_ifc_file("a.ifc", 10, "1700000000000-aaaaaaaaaa-a.ifc", false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::error::ApiError::App { status, .. } if status == http::StatusCode::BAD_REQUEST
        ));
    }

    #[sqlx::test]
    async fn delete_returns_the_s3_key(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };

        let (file, _) = catalog
            .create_pending_ifc_file("a.ifc", 10, "1700000000000-aaaaaaaaaa-a.ifc", false)
            .await
            .unwrap();

        let deleted_key = catalog.delete_ifc_file(file.id).await.unwrap();
        assert_eq!(deleted_key.as_deref(), Some("1700000000000-aaaaaaaaaa-a.ifc"));
        assert!(catalog.get_ifc_file(file.id).await.unwrap().is_none());
    }
}
