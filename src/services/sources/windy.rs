//! Windy public webcam directory.
//!
//! The free tier returns titles but no coordinates, so items normally
//! carry a `geocode_query` derived from the title. When the API key's
//! plan includes location data (`WINDY_INCLUDE_LOCATION`), coordinates
//! from the payload are used directly.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::fields::{first_number, first_string, nested, nested_string, NumberField};
use super::{
    extract_items, NormalizedBatch, PageRequest, Pagination, SkipReason, SourceAdapter, WriteMode,
};
use crate::config::{BoundingBox, WindyConfig};
use crate::error::{AppError, AppResult};
use crate::http_client::HttpClient;
use crate::models::{CameraCandidate, CameraType, EmbedType, GeoPoint};
use crate::services::title_parser::parse_location_from_title;

pub const SOURCE: &str = "windy";
const WEBCAM_PAGE_BASE: &str = "https://windy.com/webcams";
const UNTITLED: &str = "Untitled Webcam";

pub struct WindyAdapter {
    http: HttpClient,
    api_key: String,
    api_base: String,
    bbox: BoundingBox,
    pagination: Pagination,
    include_location: bool,
}

impl WindyAdapter {
    pub fn new(config: &WindyConfig) -> AppResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Config("WINDY_API_KEY is not set".to_string()))?;

        Ok(Self {
            http: HttpClient::new(&config.user_agent, config.timeout)?,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bbox: config.bbox,
            pagination: Pagination {
                page_size: config.page_size,
                max_total: config.max_cams,
            },
            include_location: config.include_location,
        })
    }

    fn page_url(&self, page: PageRequest) -> String {
        let limit = if page.limit == 0 {
            self.pagination.page_size
        } else {
            page.limit
        };
        let mut url = format!(
            "{}/webcams/api/v3/webcams?bbox={}&limit={}&offset={}",
            self.api_base,
            self.bbox.to_query_value(),
            limit,
            page.offset
        );
        if self.include_location {
            url.push_str("&show=webcams:location,image,player");
        }
        url
    }

    fn normalize_item(item: &Value) -> Result<CameraCandidate, (String, SkipReason)> {
        let Some(obj) = item.as_object() else {
            return Err(("unknown".to_string(), SkipReason::NotAnObject));
        };

        let id = first_string(obj, &["webcamId", "id"])
            .ok_or_else(|| ("unknown".to_string(), SkipReason::MissingField("webcamId")))?;

        let title = first_string(obj, &["title"]);
        let name = title.clone().unwrap_or_else(|| UNTITLED.to_string());
        let page_url = format!("{}/{}", WEBCAM_PAGE_BASE, id);

        let status = first_string(obj, &["status"]);
        let is_online = status.as_deref().map(|s| s == "active").unwrap_or(true);
        let view_count = obj.get("viewCount").and_then(Value::as_u64).unwrap_or(0);

        let camera_type = obj
            .get("categories")
            .and_then(Value::as_array)
            .map(|cats| camera_type_from_categories(cats))
            .unwrap_or(CameraType::Other);

        let embed_url = nested_string(item, &["player", "lifetime", "embed"])
            .or_else(|| nested_string(item, &["player", "day", "embed"]))
            .unwrap_or_else(|| page_url.clone());
        let thumbnail_url = nested_string(item, &["image", "current", "preview"])
            .or_else(|| nested_string(item, &["image", "daylight", "preview"]));

        let mut candidate = CameraCandidate {
            description: Some(format!("Views: {}", view_count)),
            source_url: Some(page_url),
            thumbnail_url,
            camera_type,
            embed_type: EmbedType::Iframe,
            is_online,
            metadata: json!({
                "viewCount": view_count,
                "lastUpdated": obj.get("lastUpdatedOn").cloned().unwrap_or(Value::Null),
            }),
            ..CameraCandidate::new(SOURCE, &id, &name, &embed_url)
        };

        if let Some(location) = nested(item, &["location"]).and_then(Value::as_object) {
            let lat = first_number(location, &["latitude", "lat"]);
            let lon = first_number(location, &["longitude", "lon"]);
            if let (NumberField::Value(lat), NumberField::Value(lon)) = (lat, lon) {
                candidate.location = GeoPoint::new(lat, lon);
            }
            if candidate.location.is_some() {
                candidate.city = first_string(location, &["city"]);
                candidate.state = first_string(location, &["region", "region_code"]);
                candidate.country = first_string(location, &["country", "country_code"]);
            }
        }

        if candidate.location.is_none() {
            candidate.geocode_query = title
                .as_deref()
                .map(parse_location_from_title)
                .filter(|q| !q.is_empty());
        }

        Ok(candidate)
    }
}

fn camera_type_from_categories(categories: &[Value]) -> CameraType {
    categories
        .iter()
        .filter_map(|c| match c {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o
                .get("id")
                .or_else(|| o.get("name"))
                .and_then(Value::as_str),
            _ => None,
        })
        .find_map(CameraType::from_category)
        .unwrap_or(CameraType::Other)
}

#[async_trait]
impl SourceAdapter for WindyAdapter {
    fn source(&self) -> &str {
        SOURCE
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::PerRecord
    }

    fn pagination(&self) -> Option<Pagination> {
        Some(self.pagination)
    }

    async fn fetch(&self, page: PageRequest) -> AppResult<Value> {
        tracing::info!("Fetching webcams (offset: {})", page.offset);
        let raw: Value = self
            .http
            .get_json(&self.page_url(page), &[("x-windy-api-key", self.api_key.as_str())])
            .await?;

        if let Some(total) = raw.get("total").and_then(Value::as_u64) {
            tracing::info!("Windy reports {} webcams in region", total);
        }
        Ok(raw)
    }

    fn normalize(&self, raw: &Value) -> NormalizedBatch {
        let items = extract_items(raw, &["webcams", "data", "cameras"]);
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
        batch
    }
}
