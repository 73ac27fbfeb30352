// Florida DOT (FL511) traffic cameras

use async_trait::async_trait;
use serde_json::{json, Value};

use super::fields::{first_number, first_string, NumberField};
use super::{extract_items, NormalizedBatch, PageRequest, SkipReason, SourceAdapter, WriteMode};
use crate::config::DotConfig;
use crate::error::AppResult;
use crate::http_client::HttpClient;
use crate::models::{CameraCandidate, CameraType, EmbedType, GeoPoint};

pub const SOURCE: &str = "dot_fl";
const STATE_CODE: &str = "FL";
const CAMERA_PAGE_BASE: &str = "https://fl511.com/cameras";

const ID_KEYS: &[&str] = &["Id", "id", "CameraId"];
const NAME_KEYS: &[&str] = &["Description", "description", "RoadwayName"];
const LAT_KEYS: &[&str] = &["Latitude", "latitude", "lat"];
const LON_KEYS: &[&str] = &["Longitude", "longitude", "lon", "lng"];
const URL_KEYS: &[&str] = &["Url", "url"];
const IMAGE_KEYS: &[&str] = &["ImageUrl", "imageUrl"];
const CITY_KEYS: &[&str] = &["City", "city"];

pub struct FloridaDotAdapter {
    http: HttpClient,
    url: String,
}

impl FloridaDotAdapter {
    pub fn new(config: &DotConfig) -> AppResult<Self> {
        Ok(Self {
            http: HttpClient::new(&config.user_agent, config.timeout)?,
            url: config.fl511_url.clone(),
        })
    }

    fn normalize_item(item: &Value) -> Result<CameraCandidate, (String, SkipReason)> {
        let Some(item) = item.as_object() else {
            return Err(("unknown".to_string(), SkipReason::NotAnObject));
        };

        let id = first_string(item, ID_KEYS)
            .ok_or_else(|| ("unknown".to_string(), SkipReason::MissingField("Id")))?;

        let latitude = coordinate(item, LAT_KEYS, "Latitude").map_err(|r| (id.clone(), r))?;
        let longitude = coordinate(item, LON_KEYS, "Longitude").map_err(|r| (id.clone(), r))?;
        let location =
            GeoPoint::new(latitude, longitude).ok_or_else(|| (id.clone(), SkipReason::ZeroCoordinate))?;

        let name = first_string(item, NAME_KEYS).unwrap_or_else(|| format!("Camera {}", id));
        let page_url = format!("{}/{}", CAMERA_PAGE_BASE, id);

        let (embed_url, embed_type) = match (first_string(item, URL_KEYS), first_string(item, IMAGE_KEYS)) {
            (Some(url), _) => (url, EmbedType::Iframe),
            (None, Some(image)) => (image, EmbedType::Image),
            (None, None) => (page_url.clone(), EmbedType::Iframe),
        };

        let mut metadata = serde_json::Map::new();
        if let Some(roadway) = first_string(item, &["RoadwayName"]) {
            metadata.insert("roadway".to_string(), json!(roadway));
        }

        Ok(CameraCandidate {
            location: Some(location),
            city: first_string(item, CITY_KEYS),
            state: Some(STATE_CODE.to_string()),
            country: Some("US".to_string()),
            source_url: Some(page_url),
            camera_type: CameraType::Traffic,
            embed_type,
            metadata: Value::Object(metadata),
            ..CameraCandidate::new(SOURCE, &id, &name, &embed_url)
        })
    }
}

fn coordinate(
    item: &serde_json::Map<String, Value>,
    keys: &[&str],
    field: &'static str,
) -> Result<f64, SkipReason> {
    match first_number(item, keys) {
        NumberField::Value(v) => Ok(v),
        NumberField::Missing => Err(SkipReason::MissingField(field)),
        NumberField::Invalid(value) => Err(SkipReason::InvalidField { field, value }),
    }
}

#[async_trait]
impl SourceAdapter for FloridaDotAdapter {
    fn source(&self) -> &str {
        SOURCE
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Bulk
    }

    async fn fetch(&self, _page: PageRequest) -> AppResult<Value> {
        tracing::info!("Fetching from {}", self.url);
        self.http.get_json(&self.url, &[]).await
    }

    fn normalize(&self, raw: &Value) -> NormalizedBatch {
        let items = extract_items(raw, &["cameras", "data"]);
        let mut batch = NormalizedBatch {
            raw_count: items.len(),
            ..Default::default()
        };

        for item in items {
            match Self::normalize_item(item) {
                Ok(candidate) => batch.candidates.push(candidate),
                Err((id, reason)) => batch.skip(SOURCE, &id, reason),
            }
        }

        tracing::info!(
            source = SOURCE,
            "Found {} cameras ({} skipped)",
            batch.candidates.len(),
            batch.skipped
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn adapter() -> FloridaDotAdapter {
        FloridaDotAdapter::new(&DotConfig {
            fl511_url: "http://127.0.0.1:1/map/mapIcons/Cameras".to_string(),
            user_agent: "test".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap()
    }

    fn sample_items() -> Value {
        json!([
            {
                "Id": "12345",
                "Description": " I-95 at Sample Rd ",
                "Latitude": 26.12345,
                "Longitude": -80.12345,
                "RoadwayName": "I-95",
                "Url": "https://fl511.com/cameras/12345"
            },
            {
                "id": 678,
                "latitude": "27.5",
                "longitude": "-82.5",
                "ImageUrl": "https://fl511.com/img/678.jpg",
                "City": "Tampa"
            },
            {
                "CameraId": "999",
                "RoadwayName": "SR-528",
                "Latitude": 28.4,
                "Longitude": -81.0
            }
        ])
    }

    #[test]
    fn test_field_aliases() {
        let batch = adapter().normalize(&sample_items());
        assert_eq!(batch.raw_count, 3);
        assert_eq!(batch.skipped, 0);

        let first = &batch.candidates[0];
        assert_eq!(first.external_id, "12345");
        assert_eq!(first.name, "I-95 at Sample Rd");
        assert_eq!(first.embed_url, "https://fl511.com/cameras/12345");
        assert_eq!(first.metadata["roadway"], "I-95");
        assert_eq!(first.camera_type, CameraType::Traffic);

        let second = &batch.candidates[1];
        assert_eq!(second.external_id, "678");
        assert_eq!(second.name, "Camera 678");
        assert_eq!(second.embed_type, EmbedType::Image);
        assert_eq!(second.city.as_deref(), Some("Tampa"));
        assert_eq!(second.location.unwrap().latitude(), 27.5);

        let third = &batch.candidates[2];
        assert_eq!(third.external_id, "999");
        assert_eq!(third.name, "SR-528");
        assert_eq!(third.embed_url, "https://fl511.com/cameras/999");
    }

    #[test]
    fn test_envelopes_normalize_identically() {
        let a = adapter();
        let bare = a.normalize(&sample_items());
        let data = a.normalize(&json!({"data": sample_items()}));
        let cameras = a.normalize(&json!({"cameras": sample_items()}));
        assert_eq!(bare.candidates, data.candidates);
        assert_eq!(bare.candidates, cameras.candidates);
    }

    #[test]
    fn test_zero_coordinates_excluded() {
        let raw = json!([
            {"Id": "1", "Latitude": 0, "Longitude": -80.1},
            {"Id": "2", "Latitude": 26.1, "Longitude": 0.0},
            {"Id": "3", "Latitude": 26.1, "Longitude": -80.1}
        ]);
        let batch = adapter().normalize(&raw);
        assert_eq!(batch.candidates.len(), 1);
        assert_eq!(batch.candidates[0].external_id, "3");
        assert_eq!(batch.skipped, 2);
    }

    #[test]
    fn test_bad_item_does_not_drop_batch() {
        let raw = json!([
            {"Id": "1", "Latitude": 26.1, "Longitude": -80.1},
            {"Description": "no id", "Latitude": 26.2, "Longitude": -80.2},
            {"Id": "3", "Latitude": "north", "Longitude": -80.3},
            "garbage",
            {"Id": "5", "Latitude": 26.5, "Longitude": -80.5}
        ]);
        let batch = adapter().normalize(&raw);
        let ids: Vec<&str> = batch.candidates.iter().map(|c| c.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "5"]);
        assert_eq!(batch.skipped, 3);
        assert_eq!(batch.raw_count, 5);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_not_panicked() {
        let err = adapter().fetch(PageRequest::single()).await.unwrap_err();
        assert!(err.is_transient());
    }
}
