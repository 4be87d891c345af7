//! `GET`/`OPTIONS /models/{filename}` — streams glTF/glB assets (spec §4.5).

use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use http::{header, StatusCode};

use crate::api::state::AppState;
use crate::error::{ApiError, Result};
use crate::service::storage::StorageError;

fn content_type_for(filename: &str) -> Result<&'static str> {
    if filename.ends_with(".glb") {
        Ok("model/gltf-binary")
    } else if filename.ends_with(".gltf") {
        Ok("model/gltf+json")
    } else {
        Err(ApiError::bad_request("unsupported model extension"))
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if lazy_regex::regex_is_match!(r"^[a-f0-9-]+\.(glb|gltf)$", filename) {
        Ok(())
    } else {
        Err(ApiError::bad_request("invalid model filename"))
    }
}

pub async fn stream_model(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response> {
    validate_filename(&filename)?;
    let content_type = content_type_for(&filename)?;
    let key = format!("models/{filename}");

    let (metadata, stream) = state.storage.get_stream(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) => ApiError::not_found("Model not found"),
        StorageError::Other(source) => ApiError::Storage(source),
    })?;

    let body = Body::from_stream(stream.map_err(std::io::Error::other));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.content_length)
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{filename}\""),
        )
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(body)
        .expect("static headers always build a valid response"))
}

/// `OPTIONS /models/{filename}` — CORS preflight, same permissive headers as the GET.
pub async fn preflight_model() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS")
        .body(Body::empty())
        .expect("static headers always build a valid response")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glb_maps_to_binary_content_type() {
        assert_eq!(content_type_for("abc-123.glb").unwrap(), "model/gltf-binary");
    }

    #[test]
    fn gltf_maps_to_json_content_type() {
        assert_eq!(content_type_for("abc-123.gltf").unwrap(), "model/gltf+json");
    }

    #[test]
    fn rejects_unsupported_extension() {
        assert!(content_type_for("abc-123.obj").is_err());
    }

    #[test]
    fn validates_well_formed_filenames() {
        assert!(validate_filename("0f1e2d3c-4b5a-6978-8970-abcdefabcdef.glb").is_ok());
    }

    #[test]
    fn rejects_path_traversal_attempts() {
        assert!(validate_filename("../../etc/passwd.glb").is_err());
    }

    #[test]
    fn rejects_uppercase_or_unexpected_characters() {
        assert!(validate_filename("UPPERCASE.glb").is_err());
        assert!(validate_filename("has space.glb").is_err());
    }
}
