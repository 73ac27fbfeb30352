use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CameraCandidate, CameraRecord, GeoPoint};
use crate::registry::{dedup_by_key, CameraRegistry};
use crate::services::geocoder::GeocodingService;
use crate::services::sources::{
    cap_items, NormalizedBatch, PageRequest, SourceAdapter, WriteMode,
};

/// Counters for one source run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub source: String,
    /// Raw items seen across all fetched pages.
    pub fetched: usize,
    pub skipped: usize,
    pub geocode_misses: usize,
    /// Records the registry rejected.
    pub failed: usize,
    pub saved: usize,
    pub elapsed: Duration,
}

/// Drives sources through fetch, normalize, geocode and upsert, one at a time.
pub struct RunDriver {
    registry: Arc<dyn CameraRegistry>,
    geocoding: GeocodingService,
}

impl RunDriver {
    pub fn new(registry: Arc<dyn CameraRegistry>, geocoding: GeocodingService) -> Self {
        Self {
            registry,
            geocoding,
        }
    }

    /// Runs every adapter in order. A source that fails fatally is logged and
    /// does not stop the ones after it.
    pub async fn run_all(&self, adapters: &[Box<dyn SourceAdapter>]) -> Vec<RunSummary> {
        let mut summaries = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            match self.run_source(adapter.as_ref()).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::error!("Source {} failed: {}", adapter.source(), e),
            }
        }
        summaries
    }

    pub async fn run_source(&self, adapter: &dyn SourceAdapter) -> AppResult<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", source = adapter.source(), %run_id);
        self.run_source_inner(adapter).instrument(span).await
    }

    async fn run_source_inner(&self, adapter: &dyn SourceAdapter) -> AppResult<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary {
            source: adapter.source().to_string(),
            ..Default::default()
        };
        tracing::info!("Starting {} run", summary.source);

        let mut pending_bulk: Vec<CameraRecord> = Vec::new();

        match adapter.pagination() {
            None => {
                let batch = self.fetch_page(adapter, PageRequest::single(), None).await;
                summary.fetched += batch.raw_count;
                summary.skipped += batch.skipped;
                self.process_batch(adapter, batch.candidates, &mut summary, &mut pending_bulk)
                    .await;
            }
            Some(pagination) => {
                let mut offset = 0;
                let mut processed = 0;
                while processed < pagination.max_total {
                    let limit = pagination
                        .page_size
                        .min(pagination.max_total - processed)
                        .max(1);
                    let batch = self
                        .fetch_page(adapter, PageRequest { offset, limit }, Some(limit))
                        .await;
                    if batch.raw_count == 0 {
                        tracing::info!("No more cameras at offset {}", offset);
                        break;
                    }

                    let raw_count = batch.raw_count;
                    processed += raw_count;
                    summary.fetched += raw_count;
                    summary.skipped += batch.skipped;
                    self.process_batch(adapter, batch.candidates, &mut summary, &mut pending_bulk)
                        .await;

                    if raw_count < limit {
                        break;
                    }
                    offset += pagination.page_size;
                }
            }
        }

        if adapter.write_mode() == WriteMode::Bulk && !pending_bulk.is_empty() {
            let written = self.registry.upsert_batch(&pending_bulk).await.map_err(|e| {
                tracing::error!("Bulk upsert of {} cameras failed: {}", pending_bulk.len(), e);
                e
            })?;
            tracing::info!("Bulk upsert wrote {} rows", written);
            summary.saved += dedup_by_key(&pending_bulk).len();
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            "Finished {}: fetched={} saved={} skipped={} geocode_misses={} failed={} in {:?}",
            summary.source,
            summary.fetched,
            summary.saved,
            summary.skipped,
            summary.geocode_misses,
            summary.failed,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Fetch failures are logged and read as an empty page. Items past `cap` are
    /// dropped before normalizing.
    async fn fetch_page(
        &self,
        adapter: &dyn SourceAdapter,
        page: PageRequest,
        cap: Option<usize>,
    ) -> NormalizedBatch {
        match adapter.fetch(page).await {
            Ok(mut raw) => {
                if let Some(cap) = cap {
                    let dropped = cap_items(&mut raw, cap);
                    if dropped > 0 {
                        tracing::warn!("Upstream ignored limit {}, dropped {} items", cap, dropped);
                    }
                }
                let batch = adapter.normalize(&raw);
                tracing::info!(
                    "Fetched {} items ({} usable)",
                    batch.raw_count,
                    batch.candidates.len()
                );
                batch
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!("Fetch from {} failed: {}", adapter.source(), e);
                } else {
                    tracing::error!("Fetch from {} failed: {}", adapter.source(), e);
                }
                NormalizedBatch::default()
            }
        }
    }

    async fn process_batch(
        &self,
        adapter: &dyn SourceAdapter,
        candidates: Vec<CameraCandidate>,
        summary: &mut RunSummary,
        pending_bulk: &mut Vec<CameraRecord>,
    ) {
        match adapter.write_mode() {
            WriteMode::Bulk => {
                for candidate in candidates {
                    let id = candidate.external_id.clone();
                    match candidate.into_record() {
                        Some(record) => pending_bulk.push(record),
                        None => {
                            tracing::warn!("Dropping {} without coordinates", id);
                            summary.skipped += 1;
                        }
                    }
                }
            }
            WriteMode::PerRecord => {
                for candidate in candidates {
                    let Some(record) = self.locate(candidate, summary).await else {
                        continue;
                    };
                    match self.registry.upsert_one(&record).await {
                        Ok(()) => {
                            tracing::debug!("Saved {} ({})", record.name, record.external_id);
                            summary.saved += 1;
                        }
                        Err(e) => {
                            tracing::error!("Failed to save {}: {}", record.external_id, e);
                            summary.failed += 1;
                        }
                    }
                }
            }
        }
    }

    /// Resolves a missing location through the geocoder. `None` means the record cannot be stored.
    async fn locate(
        &self,
        mut candidate: CameraCandidate,
        summary: &mut RunSummary,
    ) -> Option<CameraRecord> {
        if candidate.location.is_some() {
            return candidate.into_record();
        }

        let Some(query) = candidate.geocode_query.clone() else {
            tracing::warn!("No location text for {}", candidate.external_id);
            summary.geocode_misses += 1;
            return None;
        };

        let hit = match self.geocoding.resolve(&query).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                tracing::warn!("Could not geocode {:?} ({})", query, candidate.external_id);
                summary.geocode_misses += 1;
                return None;
            }
            Err(e) => {
                tracing::warn!("Geocoding {:?} failed: {}", query, e);
                summary.geocode_misses += 1;
                return None;
            }
        };

        let Some(point) = GeoPoint::new(hit.latitude, hit.longitude) else {
            tracing::warn!("Geocoder returned unusable point for {:?}", query);
            summary.geocode_misses += 1;
            return None;
        };

        let parts = hit.place_parts();
        candidate.location = Some(point);
        candidate.city = candidate.city.or(parts.city);
        candidate.state = candidate.state.or(parts.state);
        candidate.country = candidate.country.or(parts.country);
        candidate.into_record()
    }
}

pub fn total_saved(summaries: &[RunSummary]) -> usize {
    summaries.iter().map(|s| s.saved).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::registry::memory::MemoryRegistry;
    use crate::services::geocoder::tests::StubGeocoder;
    use crate::services::sources::{Pagination, SkipReason};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves canned pages in call order; `None` simulates a failed request.
    struct FakeAdapter {
        mode: WriteMode,
        pagination: Option<Pagination>,
        pages: Vec<Option<Value>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl FakeAdapter {
        fn new(mode: WriteMode, pages: Vec<Option<Value>>) -> Self {
            Self {
                mode,
                pagination: None,
                pages,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn paged(mut self, page_size: usize, max_total: usize) -> Self {
            self.pagination = Some(Pagination {
                page_size,
                max_total,
            });
            self
        }

        fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn source(&self) -> &str {
            "fake"
        }

        fn write_mode(&self) -> WriteMode {
            self.mode
        }

        fn pagination(&self) -> Option<Pagination> {
            self.pagination
        }

        async fn fetch(&self, page: PageRequest) -> AppResult<Value> {
            self.requests.lock().unwrap().push(page);
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(n) {
                Some(Some(value)) => Ok(value.clone()),
                Some(None) => Err(AppError::UpstreamStatus {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
                None => Ok(json!([])),
            }
        }

        fn normalize(&self, raw: &Value) -> NormalizedBatch {
            let items = raw.as_array().cloned().unwrap_or_default();
            let mut batch = NormalizedBatch {
                raw_count: items.len(),
                ..Default::default()
            };
            for item in &items {
                let id = item["id"].as_str().unwrap_or("?").to_string();
                let coords = (item["lat"].as_f64(), item["lon"].as_f64());
                let location = match coords {
                    (Some(lat), Some(lon)) => match GeoPoint::new(lat, lon) {
                        Some(point) => Some(point),
                        None => {
                            batch.skip("fake", &id, SkipReason::ZeroCoordinate);
                            continue;
                        }
                    },
                    _ => None,
                };
                batch.candidates.push(CameraCandidate {
                    location,
                    geocode_query: item["q"].as_str().map(str::to_string),
                    is_online: item["online"].as_bool().unwrap_or(true),
                    ..CameraCandidate::new(
                        "fake",
                        &id,
                        item["name"].as_str().unwrap_or(&format!("Cam {}", id)),
                        "https://cams/x",
                    )
                });
            }
            batch
        }
    }

    fn cam(id: &str, lat: f64, lon: f64) -> Value {
        json!({"id": id, "lat": lat, "lon": lon})
    }

    fn page(ids: &[&str]) -> Option<Value> {
        Some(Value::Array(ids.iter().map(|id| cam(id, 26.0, -80.0)).collect()))
    }

    fn driver(registry: Arc<MemoryRegistry>, geocoder: StubGeocoder) -> RunDriver {
        RunDriver::new(
            registry,
            GeocodingService::new(Box::new(geocoder), Duration::from_millis(1100)),
        )
    }

    #[tokio::test]
    async fn test_rerun_updates_in_place() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));

        let first = FakeAdapter::new(
            WriteMode::Bulk,
            vec![Some(json!([cam("1", 26.1, -80.1), cam("2", 27.2, -81.3)]))],
        );
        let second = FakeAdapter::new(
            WriteMode::Bulk,
            vec![Some(json!([
                {"id": "1", "name": "I-95 @ Exit 5", "lat": 26.5, "lon": -80.4, "online": false},
                cam("2", 27.2, -81.3)
            ]))],
        );

        assert_eq!(driver.run_source(&first).await.unwrap().saved, 2);
        assert_eq!(driver.run_source(&second).await.unwrap().saved, 2);
        assert_eq!(registry.len(), 2);

        let stored = registry.get("fake", "1").unwrap();
        assert_eq!(stored.name, "I-95 @ Exit 5");
        assert_eq!(stored.location.latitude(), 26.5);
        assert_eq!(stored.location.longitude(), -80.4);
        assert!(!stored.is_online);
        assert_eq!(registry.get("fake", "2").unwrap().name, "Cam 2");
    }

    #[tokio::test]
    async fn test_bulk_saved_counts_distinct_keys() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        let adapter = FakeAdapter::new(
            WriteMode::Bulk,
            vec![Some(json!([
                cam("1", 26.1, -80.1),
                cam("2", 27.2, -81.3),
                {"id": "1", "name": "Latest", "lat": 26.1, "lon": -80.1}
            ]))],
        );

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(summary.saved, 2);
        assert_eq!(registry.get("fake", "1").unwrap().name, "Latest");
    }

    #[tokio::test]
    async fn test_zero_coordinates_never_stored() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        let adapter = FakeAdapter::new(
            WriteMode::Bulk,
            vec![Some(json!([cam("1", 0.0, -80.1), cam("2", 26.0, 0.0), cam("3", 26.0, -80.0)]))],
        );

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.saved, 1);
        assert!(registry.get("fake", "1").is_none());
        assert!(registry.get("fake", "3").is_some());
    }

    #[tokio::test]
    async fn test_per_record_failure_is_isolated() {
        let registry = Arc::new(MemoryRegistry::failing_on(&["2"]));
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        let adapter = FakeAdapter::new(WriteMode::PerRecord, vec![page(&["1", "2", "3"])]);

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.failed, 1);
        assert!(registry.get("fake", "1").is_some());
        assert!(registry.get("fake", "3").is_some());
    }

    #[tokio::test]
    async fn test_bulk_failure_is_fatal_for_source_only() {
        let registry = Arc::new(MemoryRegistry::failing_on(&["2"]));
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));

        let failing = FakeAdapter::new(WriteMode::Bulk, vec![page(&["1", "2"])]);
        assert!(driver.run_source(&failing).await.is_err());
        assert_eq!(registry.len(), 0);

        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(FakeAdapter::new(WriteMode::Bulk, vec![page(&["1", "2"])])),
            Box::new(FakeAdapter::new(WriteMode::PerRecord, vec![page(&["5"])])),
        ];
        let summaries = driver.run_all(&adapters).await;
        assert_eq!(summaries.len(), 1);
        assert_eq!(total_saved(&summaries), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_empty_run() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        let adapter = FakeAdapter::new(WriteMode::Bulk, vec![None]);

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.saved, 0);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_pagination_stops_on_short_page() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        let adapter = FakeAdapter::new(
            WriteMode::PerRecord,
            vec![page(&["1", "2"]), page(&["3"]), page(&["4", "5"])],
        )
        .paged(2, 100);

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(adapter.requests().len(), 2);
        assert_eq!(adapter.requests()[1], PageRequest { offset: 2, limit: 2 });
        assert_eq!(summary.saved, 3);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_max_total() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        let adapter = FakeAdapter::new(
            WriteMode::PerRecord,
            vec![page(&["1", "2"]), page(&["3", "4"]), page(&["5", "6"])],
        )
        .paged(2, 3);

        let summary = driver.run_source(&adapter).await.unwrap();
        let requests = adapter.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], PageRequest { offset: 2, limit: 1 });
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.saved, 3);
        assert!(registry.get("fake", "4").is_none());
    }

    #[tokio::test]
    async fn test_oversized_page_is_capped_before_normalizing() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        // The second request asks for one item; the upstream returns three,
        // the first of which is unusable.
        let adapter = FakeAdapter::new(
            WriteMode::PerRecord,
            vec![
                page(&["1", "2"]),
                Some(json!([cam("x", 0.0, -80.0), cam("3", 26.0, -80.0), cam("4", 26.0, -80.0)])),
            ],
        )
        .paged(2, 3);

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.saved, 2);
        assert!(registry.get("fake", "3").is_none());
        assert!(registry.get("fake", "4").is_none());
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let registry = Arc::new(MemoryRegistry::default());
        let driver = driver(registry.clone(), StubGeocoder::new(&[]));
        let adapter =
            FakeAdapter::new(WriteMode::PerRecord, vec![page(&["1", "2"]), Some(json!([]))])
                .paged(2, 100);

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(adapter.requests().len(), 2);
        assert_eq!(summary.saved, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_geocoding_fills_location_and_skips_misses() {
        let registry = Arc::new(MemoryRegistry::default());
        let stub = StubGeocoder {
            fail_on: Some("Broken".to_string()),
            ..StubGeocoder::new(&[(
                "Venice Beach, Los Angeles",
                33.98,
                -118.47,
                "Venice Beach, Los Angeles, California, United States",
            )])
        };
        let calls = stub.calls.clone();
        let driver = driver(registry.clone(), stub);
        let adapter = FakeAdapter::new(
            WriteMode::PerRecord,
            vec![Some(json!([
                {"id": "1", "q": "Venice Beach, Los Angeles"},
                {"id": "2", "q": "Nowhere"},
                {"id": "3", "q": "Broken"},
                {"id": "4"},
                {"id": "5", "q": "Venice Beach, Los Angeles"}
            ]))],
        );

        let summary = driver.run_source(&adapter).await.unwrap();
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.geocode_misses, 3);
        // second lookup of the same text comes from the cache
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stored = registry.get("fake", "1").unwrap();
        assert_eq!(stored.location.latitude(), 33.98);
        assert_eq!(stored.city.as_deref(), Some("Venice Beach"));
        assert_eq!(stored.state.as_deref(), Some("California"));
        assert_eq!(stored.country.as_deref(), Some("United States"));
        assert!(registry.get("fake", "2").is_none());
        assert!(registry.get("fake", "3").is_none());
    }
}
