//! `GET /buildings`, `GET /buildings/{id}`, `DELETE /buildings/{id}` (spec §4.3).

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json, Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{header, HeaderMap, StatusCode};
use sha2::{Digest, Sha256};

use crate::api::state::AppState;
use crate::error::{ApiError, Result};
use crate::ids::BuildingId;
use crate::service::building::{to_feature_collection, BoundingBox, GeoJsonFeature};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

fn parse_limit(raw: Option<&String>) -> Result<i64> {
    match raw {
        None => Ok(DEFAULT_LIMIT),
        Some(raw) => {
            let limit: i64 = raw
                .parse()
                .map_err(|_| ApiError::bad_request("limit must be an integer"))?;
            if (1..=MAX_LIMIT).contains(&limit) {
                Ok(limit)
            } else {
                Err(ApiError::bad_request(format!(
                    "limit must be between 1 and {MAX_LIMIT}"
                )))
            }
        }
    }
}

/// Weak ETag over a stable hash of the serialized body (spec §4.3 bullet 4).
fn weak_etag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("W/\"{}\"", STANDARD.encode(&digest[..12]))
}

pub async fn list_buildings(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response> {
    let bbox = params
        .get("bbox")
        .map(|raw| BoundingBox::parse(raw).map_err(ApiError::bad_request))
        .transpose()?;
    let limit = parse_limit(params.get("limit"))?;
    let cursor = params
        .get("cursor")
        .map(|raw| {
            raw.parse::<uuid::Uuid>()
                .map(BuildingId::from)
                .map_err(|_| ApiError::bad_request("cursor must be a UUID"))
        })
        .transpose()?;

    let (body, etag) = match state.cache.get(bbox, limit, cursor).await {
        Some(hit) => hit,
        None => {
            let buildings = state.db.list_buildings_in_bbox(bbox, limit, cursor).await?;
            let collection = to_feature_collection(&buildings, limit as usize, bbox);
            let body = serde_json::to_vec(&collection).expect("GeoJSON collection always serializes");
            let etag = weak_etag(&body);
            let body_str = String::from_utf8(body).expect("GeoJSON collection is valid utf8");

            state.cache.set(bbox, limit, cursor, &body_str, &etag).await;
            (body_str, etag)
        }
    };

    if headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag)
    {
        return Ok(Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, etag)
            .header(header::CACHE_CONTROL, "public, max-age=300, must-revalidate")
            .body(axum::body::Body::empty())
            .expect("static headers always build a valid response"));
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/geo+json")
        .header(header::ETAG, etag)
        .header(header::CACHE_CONTROL, "public, max-age=300, must-revalidate")
        .body(axum::body::Body::from(body))
        .expect("static headers always build a valid response"))
}

pub async fn get_building(
    State(state): State<AppState>,
    Path(id): Path<BuildingId>,
) -> Result<Json<GeoJsonFeature>> {
    let building = state
        .db
        .get_building(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Building not found"))?;

    Ok(Json(GeoJsonFeature::from(&building)))
}

pub async fn delete_building(
    State(state): State<AppState>,
    Path(id): Path<BuildingId>,
) -> Result<impl IntoResponse> {
    let (s3_key, model_url) = state.db.delete_building_cascade(id).await?;
    state.cache.invalidate_all().await;

    if let Some(s3_key) = s3_key {
        if let Err(err) = state.storage.delete(&s3_key).await {
            tracing::warn!(error = %err, %s3_key, "best-effort delete of ifc object failed");
        }
    }
    if let Some(model_url) = model_url {
        if let Some(model_key) = model_key_from_url(&model_url) {
            if let Err(err) = state.storage.delete(&model_key).await {
                tracing::warn!(error = %err, model_key, "best-effort delete of model object failed");
            }
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

fn model_key_from_url(model_url: &str) -> Option<String> {
    model_url
        .rsplit_once('/')
        .map(|(_, filename)| format!("models/{filename}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_stable_for_identical_bodies() {
        let body = b"{\"type\":\"FeatureCollection\"}";
        assert_eq!(weak_etag(body), weak_etag(body));
    }

    #[test]
    fn etag_differs_for_different_bodies() {
        assert_ne!(weak_etag(b"a"), weak_etag(b"b"));
    }

    #[test]
    fn etag_is_weak_and_quoted() {
        let etag = weak_etag(b"payload");
        assert!(etag.starts_with("W/\""));
        assert!(etag.ends_with('"'));
    }

    #[test]
    fn limit_defaults_when_absent() {
        assert_eq!(parse_limit(None).unwrap(), DEFAULT_LIMIT);
    }

    #[test]
    fn limit_rejects_zero() {
        assert!(parse_limit(Some(&"0".to_string())).is_err());
    }

    #[test]
    fn limit_rejects_above_max() {
        assert!(parse_limit(Some(&"1001".to_string())).is_err());
    }

    #[test]
    fn limit_accepts_in_range_value() {
        assert_eq!(parse_limit(Some(&"250".to_string())).unwrap(), 250);
    }

    #[test]
    fn model_key_extracts_trailing_segment() {
        assert_eq!(
            model_key_from_url("https://cdn.example.com/models/abc-123.glb"),
            Some("models/abc-123.glb".to_string())
        );
    }
}
