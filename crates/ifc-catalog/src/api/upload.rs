//! `POST /upload/request`, `POST /upload/complete`, `GET /upload/status/{taskId}`.

use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::error::{ApiError, Result};
use crate::ids::IfcFileId;
use crate::service::ifc_file::{generate_s3_key, validate_upload_request, UploadRequestBody};

#[derive(Serialize)]
pub struct UploadRequestResponse {
    #[serde(rename = "fileId")]
    file_id: IfcFileId,
    #[serde(rename = "presignedUrl")]
    presigned_url: String,
    #[serde(rename = "s3Key")]
    s3_key: String,
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

pub async fn request_upload(
    State(state): State<AppState>,
    Json(body): Json<UploadRequestBody>,
) -> Result<Json<UploadRequestResponse>> {
    validate_upload_request(&body, state.config.max_file_size_bytes())
        .map_err(ApiError::validation)?;

    // Single-file replacement sweep happens inside the same DB transaction as the
    // insert, so it can never race ahead of / delete the row it's about to create
    // (spec §5 ordering guarantee).
    let s3_key = generate_s3_key(&body.file_name);
    let expires_in = state.config.presigned_url_expiry_seconds;

    let presigned_url = state
        .storage
        .presign_put(
            &s3_key,
            &body.content_type,
            std::time::Duration::from_secs(expires_in),
        )
        .await
        .map_err(|e| ApiError::Storage(e.into()))?;

    let (ifc_file, replaced_s3_keys) = state
        .db
        .create_pending_ifc_file(
            &body.file_name,
            body.file_size,
            &s3_key,
            state.config.single_file_replacement_policy,
        )
        .await?;

    // Best-effort cleanup of the objects the replacement sweep just orphaned; failures
    // are logged but never abort the request (spec §4.2 effect 1).
    for replaced_key in replaced_s3_keys {
        if let Err(err) = state.storage.delete(&replaced_key).await {
            tracing::warn!(error = %err, s3_key = replaced_key, "best-effort delete of replaced ifc object failed");
        }
    }

    Ok(Json(UploadRequestResponse {
        file_id: ifc_file.id,
        presigned_url,
        s3_key: ifc_file.s3_key,
        expires_in,
    }))
}

#[derive(Deserialize)]
pub struct CompleteUploadBody {
    #[serde(rename = "fileId")]
    file_id: IfcFileId,
    #[serde(rename = "s3Key")]
    s3_key: String,
}

#[derive(Serialize)]
pub struct CompleteUploadResponse {
    success: bool,
    #[serde(rename = "fileId")]
    file_id: IfcFileId,
    #[serde(rename = "fileName")]
    file_name: String,
    #[serde(rename = "uploadStatus")]
    upload_status: String,
    #[serde(rename = "processingStatus")]
    processing_status: String,
    #[serde(rename = "taskId")]
    task_id: Uuid,
}

pub async fn complete_upload(
    State(state): State<AppState>,
    Json(body): Json<CompleteUploadBody>,
) -> Result<Json<CompleteUploadResponse>> {
    let existing = state
        .db
        .get_ifc_file(body.file_id)
        .await?
        .ok_or_else(|| ApiError::not_found("IfcFile not found"))?;

    if existing.s3_key != body.s3_key {
        return Err(ApiError::bad_request("S3 key mismatch"));
    }

    state
        .storage
        .exists(&existing.s3_key)
        .await
        .map_err(|e| ApiError::Storage(e.into()))?
        .then_some(())
        .ok_or_else(|| ApiError::bad_request("File not found in storage"))?;

    // HEAD succeeded; commit the status transition before attempting the broker
    // enqueue, so a later rollback can never precede a successful enqueue
    // (spec §5 ordering guarantee).
    let (ifc_file, should_enqueue) = state.db.complete_ifc_file(body.file_id).await?;

    let task_id = if should_enqueue {
        state
            .broker
            .enqueue_ifc_processing(ifc_file.id.into_uuid(), &ifc_file.s3_key)
            .await
            .map_err(ApiError::Broker)?
    } else {
        // Duplicate /complete call: processing was already dispatched once. Report the
        // existing row's status without enqueuing a second task (spec §9 resolution #2).
        Uuid::nil()
    };

    Ok(Json(CompleteUploadResponse {
        success: true,
        file_id: ifc_file.id,
        file_name: ifc_file.file_name,
        upload_status: ifc_file.upload_status.to_string(),
        processing_status: ifc_file.processing_status.to_string(),
        task_id,
    }))
}

#[derive(Serialize)]
pub struct UploadStatusResponse {
    #[serde(rename = "taskId")]
    task_id: Uuid,
    status: String,
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn upload_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<UploadStatusResponse>> {
    let result = state
        .broker
        .task_result(task_id)
        .await
        .map_err(ApiError::Broker)?
        .unwrap_or_else(crate::service::broker::TaskResult::pending);

    let error = result.user_visible_error();

    Ok(Json(UploadStatusResponse {
        task_id,
        status: result.status.to_string(),
        result: result.result,
        error,
    }))
}
