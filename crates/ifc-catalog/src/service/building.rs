//! `Building` domain type and its GeoJSON rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::ids::{BuildingId, IfcFileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelFormat {
    Glb,
    Gltf,
}

#[derive(Debug, Clone)]
pub struct Building {
    pub id: BuildingId,
    pub ifc_file_id: IfcFileId,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub height: Option<f64>,
    pub floor_count: Option<i32>,
    pub longitude: f64,
    pub latitude: f64,
    pub model_url: Option<String>,
    pub model_format: Option<ModelFormat>,
    pub model_size_mb: Option<f64>,
    pub model_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A bounding box in `minLon,minLat,maxLon,maxLat` order (spec §6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let parts: Vec<&str> = raw.split(',').collect();
        let [min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
            return Err("bbox must have exactly four comma-separated values".to_string());
        };
        let parse_f64 = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| format!("'{s}' is not a valid decimal"))
        };
        let bbox = Self {
            min_lon: parse_f64(min_lon)?,
            min_lat: parse_f64(min_lat)?,
            max_lon: parse_f64(max_lon)?,
            max_lat: parse_f64(max_lat)?,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    fn validate(&self) -> Result<(), String> {
        if !(-180.0..=180.0).contains(&self.min_lon) || !(-180.0..=180.0).contains(&self.max_lon) {
            return Err("longitude must be within [-180, 180]".to_string());
        }
        if !(-90.0..=90.0).contains(&self.min_lat) || !(-90.0..=90.0).contains(&self.max_lat) {
            return Err("latitude must be within [-90, 90]".to_string());
        }
        if self.min_lon >= self.max_lon {
            return Err("minLon must be strictly less than maxLon".to_string());
        }
        if self.min_lat >= self.max_lat {
            return Err("minLat must be strictly less than maxLat".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct GeoJsonFeature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: BuildingId,
    pub geometry: GeoJsonGeometry,
    pub properties: GeoJsonProperties,
}

#[derive(Debug, Serialize)]
pub struct GeoJsonGeometry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Serialize)]
pub struct GeoJsonProperties {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub height: Option<f64>,
    #[serde(rename = "floorCount")]
    pub floor_count: Option<i32>,
    #[serde(rename = "ifcFileId")]
    pub ifc_file_id: IfcFileId,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "modelUrl")]
    pub model_url: Option<String>,
    #[serde(rename = "modelFormat")]
    pub model_format: Option<ModelFormat>,
    #[serde(rename = "modelSizeMb")]
    pub model_size_mb: Option<f64>,
    #[serde(rename = "modelGeneratedAt")]
    pub model_generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct GeoJsonFeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub features: Vec<GeoJsonFeature>,
    pub metadata: GeoJsonMetadata,
}

#[derive(Debug, Serialize)]
pub struct GeoJsonMetadata {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<BuildingId>,
}

impl From<&Building> for GeoJsonFeature {
    fn from(b: &Building) -> Self {
        Self {
            kind: "Feature",
            id: b.id,
            geometry: GeoJsonGeometry {
                kind: "Point",
                coordinates: [b.longitude, b.latitude],
            },
            properties: GeoJsonProperties {
                name: b.name.clone(),
                address: b.address.clone(),
                city: b.city.clone(),
                country: b.country.clone(),
                height: b.height,
                floor_count: b.floor_count,
                ifc_file_id: b.ifc_file_id,
                created_at: b.created_at,
                updated_at: b.updated_at,
                model_url: b.model_url.clone(),
                model_format: b.model_format,
                model_size_mb: b.model_size_mb,
                model_generated_at: b.model_generated_at,
            },
        }
    }
}

/// Build a feature collection, attaching `nextCursor` only when the page is full
/// (spec §4.3 bullet 3 / §8 invariant).
#[must_use]
pub fn to_feature_collection(
    buildings: &[Building],
    limit: usize,
    bbox: Option<BoundingBox>,
) -> GeoJsonFeatureCollection {
    let features: Vec<GeoJsonFeature> = buildings.iter().map(GeoJsonFeature::from).collect();
    let next_cursor = if features.len() == limit {
        features.last().map(|f| f.id)
    } else {
        None
    };
    GeoJsonFeatureCollection {
        kind: "FeatureCollection",
        metadata: GeoJsonMetadata {
            count: features.len(),
            bbox: bbox.map(|b| [b.min_lon, b.min_lat, b.max_lon, b.max_lat]),
            next_cursor,
        },
        features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_rejects_inverted_longitude() {
        assert!(BoundingBox::parse("12.6,41.8,12.4,42.0").is_err());
    }

    #[test]
    fn bbox_rejects_out_of_range_latitude() {
        assert!(BoundingBox::parse("12.4,-95,12.6,42.0").is_err());
    }

    #[test]
    fn bbox_parses_happy_path() {
        let bbox = BoundingBox::parse("12.4,41.8,12.6,42.0").unwrap();
        assert_eq!(bbox.min_lon, 12.4);
        assert_eq!(bbox.max_lat, 42.0);
    }

    #[test]
    fn next_cursor_absent_when_page_not_full() {
        let collection = to_feature_collection(&[], 100, None);
        assert!(collection.metadata.next_cursor.is_none());
    }
}
