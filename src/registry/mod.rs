// Camera registry abstraction (PostGIS backed in production)

pub mod postgres;

pub use postgres::PgCameraRegistry;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::AppResult;
use crate::models::CameraRecord;

/// Idempotent writes keyed by `(source, external_id)`.
#[async_trait]
pub trait CameraRegistry: Send + Sync {
    /// Upserts one record in its own transaction. On failure the transaction is rolled back.
    async fn upsert_one(&self, record: &CameraRecord) -> AppResult<()>;

    /// Upserts all records in a single transaction; either every row is written or none.
    /// Returns the number of rows written.
    async fn upsert_batch(&self, records: &[CameraRecord]) -> AppResult<u64>;
}

/// Collapses repeated keys in a batch, keeping the last occurrence in its original slot.
///
/// A single `INSERT ... ON CONFLICT` cannot touch the same row twice.
pub fn dedup_by_key(records: &[CameraRecord]) -> Vec<&CameraRecord> {
    let mut last_index: HashMap<(&str, &str), usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        last_index.insert(record.key(), i);
    }
    records
        .iter()
        .enumerate()
        .filter(|(i, record)| last_index.get(&record.key()) == Some(i))
        .map(|(_, record)| record)
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CameraCandidate, GeoPoint};

    fn record(id: &str, name: &str) -> CameraRecord {
        CameraCandidate {
            location: GeoPoint::new(26.0, -80.0),
            ..CameraCandidate::new("dot_fl", id, name, "https://fl511.com")
        }
        .into_record()
        .unwrap()
    }

    #[test]
    fn test_dedup_keeps_last_occurrence() {
        let records = vec![record("1", "old"), record("2", "b"), record("1", "new")];
        let unique = dedup_by_key(&records);
        let names: Vec<&str> = unique.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "new"]);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let registry = memory::MemoryRegistry::failing_on(&["2"]);
        let result = registry
            .upsert_batch(&[record("1", "a"), record("2", "b")])
            .await;
        assert!(result.is_err());
        assert_eq!(registry.len(), 0);
    }
}
