//! `IfcFile` domain type and its upload/processing state machine.
//!
//! Represented as enums rather than free-form strings at call sites, per the design
//! note that asks for the two-phase upload protocol to be "a small state machine on
//! `IfcFile`... not free-form strings".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::ids::IfcFileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Completed,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingStatus {
    NotStarted,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    /// §3 invariant: `processing_status` may only advance monotonically along
    /// `not_started -> processing -> (completed | failed)`.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfcFile {
    pub id: IfcFileId,
    pub file_name: String,
    pub file_size: i64,
    pub s3_key: String,
    pub upload_status: UploadStatus,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl IfcFile {
    /// §3 invariant: `upload_status = deleted` is terminal — no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.upload_status == UploadStatus::Deleted
    }
}

/// Request body for `POST /upload/request`.
#[derive(Debug, Deserialize)]
pub struct UploadRequestBody {
    pub file_name: String,
    pub file_size: i64,
    pub content_type: String,
}

/// Accepted MIME types for an IFC upload (spec §4.2).
pub const ALLOWED_CONTENT_TYPES: [&str; 3] =
    ["application/x-step", "application/ifc", "text/plain"];

pub fn mime_looks_valid(content_type: &str) -> bool {
    lazy_regex::regex_is_match!(r"^[\w-]+/[\w-+.]+$", content_type)
}

pub fn validate_upload_request(
    body: &UploadRequestBody,
    max_file_size_bytes: u64,
) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if body.file_name.is_empty() || body.file_name.len() > 255 {
        errors.push("fileName must be between 1 and 255 characters".to_string());
    } else if !body.file_name.to_lowercase().ends_with(".ifc") {
        errors.push("Only .ifc files are supported".to_string());
    }

    if body.file_size <= 0 || body.file_size as u64 > max_file_size_bytes {
        errors.push(format!(
            "fileSize must be a positive integer no greater than {max_file_size_bytes} bytes"
        ));
    }

    if !ALLOWED_CONTENT_TYPES.contains(&body.content_type.as_str())
        || !mime_looks_valid(&body.content_type)
    {
        errors.push("contentType is not an accepted MIME type".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Opaque object-storage key: `{unix_ms}-{rand_alnum}-{fileName}` (spec §4.2 step 2).
#[must_use]
pub fn generate_s3_key(file_name: &str) -> String {
    let unix_ms = chrono::Utc::now().timestamp_millis();
    let rand_alnum: String = (0..10)
        .map(|_| {
            const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
            ALPHABET[fastrand::usize(..ALPHABET.len())] as char
        })
        .collect();
    format!("{unix_ms}-{rand_alnum}-{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_ifc_extension() {
        let body = UploadRequestBody {
            file_name: "model.pdf".to_string(),
            file_size: 1024,
            content_type: "application/x-step".to_string(),
        };
        let err = validate_upload_request(&body, 100 * 1024 * 1024).unwrap_err();
        assert!(err.iter().any(|e| e.contains("Only .ifc files")));
    }

    #[test]
    fn accepts_valid_request() {
        let body = UploadRequestBody {
            file_name: "model.ifc".to_string(),
            file_size: 1_048_576,
            content_type: "application/x-step".to_string(),
        };
        assert!(validate_upload_request(&body, 100 * 1024 * 1024).is_ok());
    }

    #[test]
    fn rejects_oversized_file() {
        let body = UploadRequestBody {
            file_name: "model.ifc".to_string(),
            file_size: 200 * 1024 * 1024,
            content_type: "application/x-step".to_string(),
        };
        assert!(validate_upload_request(&body, 100 * 1024 * 1024).is_err());
    }

    #[test]
    fn s3_key_matches_expected_shape() {
        let key = generate_s3_key("model.ifc");
        assert!(lazy_regex::regex_is_match!(
            r"^\d+-[a-z0-9]+-model\.ifc$",
            &key
        ));
    }

    #[test]
    fn monotonic_processing_transitions_only() {
        assert!(ProcessingStatus::NotStarted.can_advance_to(ProcessingStatus::Processing));
        assert!(ProcessingStatus::Processing.can_advance_to(ProcessingStatus::Completed));
        assert!(ProcessingStatus::Processing.can_advance_to(ProcessingStatus::Failed));
        assert!(!ProcessingStatus::NotStarted.can_advance_to(ProcessingStatus::Completed));
        assert!(!ProcessingStatus::Completed.can_advance_to(ProcessingStatus::Processing));
    }
}
