//! Persistence for `Building` rows and the bbox spatial query.

use super::dbutils::DbErrorHandler;
use super::PostgresCatalog;
use crate::error::{ApiError, Result};
use crate::ids::BuildingId;
use crate::service::building::{Building, BoundingBox, ModelFormat};

#[derive(sqlx::FromRow)]
struct BuildingRow {
    id: BuildingId,
    ifc_file_id: crate::ids::IfcFileId,
    name: Option<String>,
    address: Option<String>,
    city: Option<String>,
    country: Option<String>,
    height: Option<f64>,
    floor_count: Option<i32>,
    longitude: f64,
    latitude: f64,
    model_url: Option<String>,
    model_format: Option<ModelFormat>,
    model_size_mb: Option<f64>,
    model_generated_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<BuildingRow> for Building {
    fn from(row: BuildingRow) -> Self {
        Self {
            id: row.id,
            ifc_file_id: row.ifc_file_id,
            name: row.name,
            address: row.address,
            city: row.city,
            country: row.country,
            height: row.height,
            floor_count: row.floor_count,
            longitude: row.longitude,
            latitude: row.latitude,
            model_url: row.model_url,
            model_format: row.model_format,
            model_size_mb: row.model_size_mb,
            model_generated_at: row.model_generated_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_COLUMNS: &str = r"
    id, ifc_file_id, name, address, city, country, height, floor_count,
    ST_X(location::geometry) AS longitude, ST_Y(location::geometry) AS latitude,
    model_url, model_format, model_size_mb, model_generated_at, created_at, updated_at
";

impl PostgresCatalog {
    /// Bbox query with cursor pagination, ordered by `id` for a stable cursor (spec
    /// §4.3). `cursor` is the last-seen `BuildingId`.
    pub async fn list_buildings_in_bbox(
        &self,
        bbox: Option<BoundingBox>,
        limit: i64,
        cursor: Option<BuildingId>,
    ) -> Result<Vec<Building>> {
        let query = format!(
            r"
            SELECT {SELECT_COLUMNS}
            FROM buildings
            WHERE ($1::float8 IS NULL OR ST_Within(
                      location::geometry,
                      ST_MakeEnvelope($1, $2, $3, $4, 4326)
                  ))
              AND ($5::uuid IS NULL OR id > $5)
            ORDER BY id
            LIMIT $6
            "
        );

        let (min_lon, min_lat, max_lon, max_lat) = match bbox {
            Some(b) => (Some(b.min_lon), Some(b.min_lat), Some(b.max_lon), Some(b.max_lat)),
            None => (None, None, None, None),
        };

        let rows = sqlx::query_as::<_, BuildingRow>(&query)
            .bind(min_lon)
            .bind(min_lat)
            .bind(max_lon)
            .bind(max_lat)
            .bind(cursor)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(DbErrorHandler::into_api_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_building(&self, id: BuildingId) -> Result<Option<Building>> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM buildings WHERE id = $1");
        let row = sqlx::query_as::<_, BuildingRow>(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(DbErrorHandler::into_api_error)?;

        Ok(row.map(Into::into))
    }

    /// Cascade delete (spec §4.3/§4.2 effect 1): delete the building row, then delete
    /// the IFC file record it references. Returns the `s3_key` of the deleted IFC file
    /// (if any) and the `model_url` of the deleted building, so the caller can issue
    /// best-effort object-storage deletes for both without blocking on their outcome.
    pub async fn delete_building_cascade(
        &self,
        id: BuildingId,
    ) -> Result<(Option<String>, Option<String>)> {
        let mut tx = self.pool().begin().await.map_err(DbErrorHandler::into_api_error)?;

        let row: Option<(crate::ids::IfcFileId, Option<String>)> = sqlx::query_as(
            "DELETE FROM buildings WHERE id = $1 RETURNING ifc_file_id, model_url",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbErrorHandler::into_api_error)?;

        let Some((ifc_file_id, model_url)) = row else {
            return Err(ApiError::not_found("Building not found"));
        };

        let ifc_file_row: Option<(String,)> =
            sqlx::query_as("DELETE FROM ifc_files WHERE id = $1 RETURNING s3_key")
                .bind(ifc_file_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(DbErrorHandler::into_api_error)?;

        tx.commit().await.map_err(DbErrorHandler::into_api_error)?;

        Ok((ifc_file_row.map(|(key,)| key), model_url))
    }
}

#[cfg(test)]
mod tests {
    use super::super::PostgresCatalog;
    use crate::ids::IfcFileId;
    use crate::service::building::BoundingBox;

    /// Buildings are written by the out-of-scope IFC processing worker, not by this
    /// crate, so tests insert rows directly rather than through a `create_building`
    /// method this crate deliberately doesn't expose.
    async fn insert_building(
        catalog: &PostgresCatalog,
        ifc_file_id: IfcFileId,
        name: &str,
        lon: f64,
        lat: f64,
    ) -> crate::ids::BuildingId {
        let row: (crate::ids::BuildingId,) = sqlx::query_as(
            r"
            INSERT INTO buildings (id, ifc_file_id, name, location)
            VALUES (gen_random_uuid(), $1, $2, ST_SetSRID(ST_MakePoint($3, $4), 4326))
            RETURNING id
            ",
        )
        .bind(ifc_file_id)
        .bind(name)
        .bind(lon)
        .bind(lat)
        .fetch_one(catalog.pool())
        .await
        .unwrap();
        row.0
    }

    async fn new_ifc_file(catalog: &PostgresCatalog, s3_key: &str) -> IfcFileId {
        catalog
            .create_pending_ifc_file("model.ifc", 10, s3_key, false)
            .await
            .unwrap()
            .0
            .id
    }

    #[sqlx::test]
    async fn bbox_filters_to_buildings_inside_the_envelope(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };
        let ifc_file_id = new_ifc_file(&catalog, "1700000000000-aaaaaaaaaa-a.ifc").await;

        insert_building(&catalog, ifc_file_id, "inside", 12.5, 41.9).await;
        insert_building(&catalog, ifc_file_id, "outside", 100.0, 45.0).await;

        let bbox = BoundingBox::parse("12.0,41.0,13.0,42.0").unwrap();
        let results = catalog
            .list_buildings_in_bbox(Some(bbox), 100, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name.as_deref(), Some("inside"));
    }

    #[sqlx::test]
    async fn cursor_pagination_advances_past_the_last_seen_id(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };
        let ifc_file_id = new_ifc_file(&catalog, "1700000000000-bbbbbbbbbb-b.ifc").await;

        for i in 0..3 {
            insert_building(&catalog, ifc_file_id, &format!("b{i}"), 12.0 + f64::from(i), 41.0).await;
        }

        let first_page = catalog.list_buildings_in_bbox(None, 2, None).await.unwrap();
        assert_eq!(first_page.len(), 2);

        let second_page = catalog
            .list_buildings_in_bbox(None, 2, Some(first_page[1].id))
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
        assert!(first_page.iter().all(|b| b.id != second_page[0].id));
    }

    #[sqlx::test]
    async fn cascade_delete_removes_building_and_ifc_file(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };
        let ifc_file_id = new_ifc_file(&catalog, "1700000000000-cccccccccc-c.ifc").await;
        let building_id = insert_building(&catalog, ifc_file_id, "doomed", 12.0, 41.0).await;

        let (s3_key, model_url) = catalog.delete_building_cascade(building_id).await.unwrap();
        assert_eq!(s3_key.as_deref(), Some("1700000000000-cccccccccc-c.ifc"));
        assert!(model_url.is_none());

        assert!(catalog.get_building(building_id).await.unwrap().is_none());
        assert!(catalog.get_ifc_file(ifc_file_id).await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn cascade_delete_of_missing_building_is_not_found(pool: sqlx::PgPool) {
        let catalog = PostgresCatalog { pool };
        let err = catalog
            .delete_building_cascade(crate::ids::BuildingId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ApiError::App { status, .. } if status == http::StatusCode::NOT_FOUND
        ));
    }
}
