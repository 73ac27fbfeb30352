use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A WGS84 point. Zero on either axis is the upstream "unset" marker and never constructs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if latitude == 0.0 || longitude == 0.0 {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraType {
    Traffic,
    Beach,
    Weather,
    City,
    Nature,
    Harbor,
    Airport,
    Other,
}

impl CameraType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraType::Traffic => "traffic",
            CameraType::Beach => "beach",
            CameraType::Weather => "weather",
            CameraType::City => "city",
            CameraType::Nature => "nature",
            CameraType::Harbor => "harbor",
            CameraType::Airport => "airport",
            CameraType::Other => "other",
        }
    }

    /// Maps a directory category label onto a camera type, if it is one we recognise.
    pub fn from_category(category: &str) -> Option<Self> {
        match category.trim().to_ascii_lowercase().as_str() {
            "beach" | "surf" => Some(CameraType::Beach),
            "traffic" => Some(CameraType::Traffic),
            "weather" => Some(CameraType::Weather),
            "city" => Some(CameraType::City),
            "landscape" | "mountain" | "lake" => Some(CameraType::Nature),
            "harbor" => Some(CameraType::Harbor),
            "airport" => Some(CameraType::Airport),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedType {
    Iframe,
    Image,
}

impl EmbedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbedType::Iframe => "iframe",
            EmbedType::Image => "image",
        }
    }
}

/// Partial camera record as produced by a source adapter's `normalize`.
///
/// `location` is `None` when the source carries no usable coordinates;
/// `geocode_query` then holds the text to resolve it from.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCandidate {
    pub source: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<GeoPoint>,
    pub geocode_query: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub source_url: Option<String>,
    pub embed_url: String,
    pub thumbnail_url: Option<String>,
    pub camera_type: CameraType,
    pub embed_type: EmbedType,
    pub is_online: bool,
    pub metadata: serde_json::Value,
}

impl CameraCandidate {
    pub fn new(source: &str, external_id: &str, name: &str, embed_url: &str) -> Self {
        Self {
            source: source.to_string(),
            external_id: external_id.to_string(),
            name: name.to_string(),
            description: None,
            location: None,
            geocode_query: None,
            city: None,
            state: None,
            country: None,
            source_url: None,
            embed_url: embed_url.to_string(),
            thumbnail_url: None,
            camera_type: CameraType::Other,
            embed_type: EmbedType::Iframe,
            is_online: true,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// Promotes the candidate to a storable record. Returns `None` while the location is unresolved.
    pub fn into_record(self) -> Option<CameraRecord> {
        let location = self.location?;
        Some(CameraRecord {
            source: self.source,
            external_id: self.external_id,
            name: self.name,
            description: self.description,
            location,
            city: self.city,
            state: self.state,
            country: self.country,
            source_url: self.source_url,
            embed_url: self.embed_url,
            thumbnail_url: self.thumbnail_url,
            camera_type: self.camera_type,
            embed_type: self.embed_type,
            is_online: self.is_online,
            metadata: self.metadata,
        })
    }
}

/// Canonical camera record written to `external_cameras`.
/// Timestamps are assigned by the store on every upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraRecord {
    pub source: String,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub source_url: Option<String>,
    pub embed_url: String,
    pub thumbnail_url: Option<String>,
    pub camera_type: CameraType,
    pub embed_type: EmbedType,
    pub is_online: bool,
    pub metadata: serde_json::Value,
}

impl CameraRecord {
    pub fn key(&self) -> (&str, &str) {
        (&self.source, &self.external_id)
    }
}

/// Row shape read back from `external_cameras`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StoredCameraModel {
    pub source: String,
    pub external_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub embed_url: String,
    pub is_online: bool,
    pub updated_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
}
