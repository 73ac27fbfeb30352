use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{dedup_by_key, CameraRegistry};
use crate::error::AppResult;
use crate::models::{CameraRecord, StoredCameraModel};

/// Rows per multi-row INSERT inside a bulk transaction.
const BULK_CHUNK_ROWS: usize = 100;

const INSERT_COLUMNS: &str = r#"
    INSERT INTO external_cameras (
        source, external_id, source_url, name, description, camera_type,
        location, city, state, country, embed_type, embed_url, thumbnail_url,
        is_online, metadata, last_checked_at, updated_at
    )
"#;

const ON_CONFLICT: &str = r#"
    ON CONFLICT (source, external_id) DO UPDATE SET
        name = EXCLUDED.name,
        description = EXCLUDED.description,
        location = EXCLUDED.location,
        city = EXCLUDED.city,
        state = EXCLUDED.state,
        country = EXCLUDED.country,
        embed_url = EXCLUDED.embed_url,
        thumbnail_url = EXCLUDED.thumbnail_url,
        is_online = EXCLUDED.is_online,
        metadata = EXCLUDED.metadata,
        updated_at = NOW(),
        last_checked_at = NOW()
"#;

pub struct PgCameraRegistry {
    pool: PgPool,
}

impl PgCameraRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        source: &str,
        external_id: &str,
    ) -> AppResult<Option<StoredCameraModel>> {
        let row = sqlx::query_as::<_, StoredCameraModel>(
            r#"
            SELECT source, external_id, name,
                   ST_Y(location::geometry) AS latitude,
                   ST_X(location::geometry) AS longitude,
                   city, state, country, embed_url, is_online,
                   updated_at, last_checked_at
            FROM external_cameras
            WHERE source = $1 AND external_id = $2
            "#,
        )
        .bind(source)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_by_source(&self, source: &str) -> AppResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM external_cameras WHERE source = $1")
                .bind(source)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn push_record_values(builder: &mut QueryBuilder<'_, Postgres>, records: &[&CameraRecord]) {
    builder.push_values(records.iter(), |mut row, record| {
        row.push_bind(record.source.clone())
            .push_bind(record.external_id.clone())
            .push_bind(record.source_url.clone())
            .push_bind(record.name.clone())
            .push_bind(record.description.clone())
            .push_bind(record.camera_type.as_str())
            .push("ST_SetSRID(ST_MakePoint(")
            .push_bind_unseparated(record.location.longitude())
            .push_unseparated(", ")
            .push_bind_unseparated(record.location.latitude())
            .push_unseparated("), 4326)")
            .push_bind(record.city.clone())
            .push_bind(record.state.clone())
            .push_bind(record.country.clone())
            .push_bind(record.embed_type.as_str())
            .push_bind(record.embed_url.clone())
            .push_bind(record.thumbnail_url.clone())
            .push_bind(record.is_online)
            .push_bind(Json(record.metadata.clone()))
            .push("NOW()")
            .push("NOW()");
    });
}

#[async_trait]
impl CameraRegistry for PgCameraRegistry {
    async fn upsert_one(&self, record: &CameraRecord) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let mut builder = QueryBuilder::<Postgres>::new(INSERT_COLUMNS);
        push_record_values(&mut builder, &[record]);
        builder.push(ON_CONFLICT);

        let result = builder.build().execute(&mut *tx).await;
        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(e.into())
            }
        }
    }

    async fn upsert_batch(&self, records: &[CameraRecord]) -> AppResult<u64> {
        let unique = dedup_by_key(records);
        if unique.is_empty() {
            return Ok(0);
        }
        if unique.len() < records.len() {
            tracing::warn!(
                "Collapsed {} duplicate camera keys in batch",
                records.len() - unique.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for chunk in unique.chunks(BULK_CHUNK_ROWS) {
            let mut builder = QueryBuilder::<Postgres>::new(INSERT_COLUMNS);
            push_record_values(&mut builder, chunk);
            builder.push(ON_CONFLICT);

            let result = builder.build().execute(&mut *tx).await;
            match result {
                Ok(done) => written += done.rows_affected(),
                Err(e) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        tracing::error!("Rollback failed: {}", rollback_err);
                    }
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;
        Ok(written)
    }
}
