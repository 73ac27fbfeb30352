//! Free-text geocoding against a Nominatim-compatible service.
//!
//! Nominatim's usage policy allows at most one request per second per
//! application, so every upstream call goes through [`RateGate`], which
//! sleeps a fixed delay *before* each call (the first one included).

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::GeocoderConfig;
use crate::error::{AppError, AppResult};
use crate::http_client::HttpClient;

/// Top match for a geocoding query.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

/// City / state / country split out of a display name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceParts {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl GeocodeHit {
    /// `"Venice Beach, Los Angeles, California, United States"` splits into
    /// city = first part, state = second to last (only with more than two
    /// parts), country = last part.
    pub fn place_parts(&self) -> PlaceParts {
        let parts: Vec<&str> = self
            .display_name
            .split(", ")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        PlaceParts {
            city: parts.first().map(|s| s.to_string()),
            state: if parts.len() > 2 {
                parts.get(parts.len() - 2).map(|s| s.to_string())
            } else {
                None
            },
            country: parts.last().map(|s| s.to_string()),
        }
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the service found nothing; `Err` is an upstream failure.
    async fn geocode(&self, query: &str) -> AppResult<Option<GeocodeHit>>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

pub struct NominatimGeocoder {
    http: HttpClient,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> AppResult<Self> {
        Ok(Self {
            http: HttpClient::new(&config.user_agent, config.timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?q={}&format=json&limit=1",
            self.base_url,
            urlencoding::encode(query)
        )
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> AppResult<Option<GeocodeHit>> {
        let places: Vec<NominatimPlace> = self.http.get_json(&self.search_url(query), &[]).await?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };

        let latitude = place.lat.trim().parse::<f64>().map_err(|e| {
            AppError::InvalidInput(format!("geocoder latitude {:?}: {}", place.lat, e))
        })?;
        let longitude = place.lon.trim().parse::<f64>().map_err(|e| {
            AppError::InvalidInput(format!("geocoder longitude {:?}: {}", place.lon, e))
        })?;

        Ok(Some(GeocodeHit {
            latitude,
            longitude,
            display_name: place.display_name,
        }))
    }
}

/// Fixed pre-call delay shared by everything that talks to the geocoder.
pub struct RateGate {
    delay: Duration,
    lock: Mutex<()>,
}

impl RateGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            lock: Mutex::new(()),
        }
    }

    pub async fn wait(&self) {
        let _guard = self.lock.lock().await;
        tracing::debug!("Geocoder rate gate: waiting {:?}", self.delay);
        tokio::time::sleep(self.delay).await;
    }
}

/// Rate-limited, cached front for a [`Geocoder`].
pub struct GeocodingService {
    geocoder: Box<dyn Geocoder>,
    gate: RateGate,
    cache: StdMutex<HashMap<String, GeocodeHit>>,
}

impl GeocodingService {
    pub fn new(geocoder: Box<dyn Geocoder>, min_delay: Duration) -> Self {
        Self {
            geocoder,
            gate: RateGate::new(min_delay),
            cache: StdMutex::new(HashMap::new()),
        }
    }

    /// Resolves a query. Cache hits return immediately without touching the upstream service.
    pub async fn resolve(&self, query: &str) -> AppResult<Option<GeocodeHit>> {
        let key = query.trim().to_string();
        if key.is_empty() {
            return Ok(None);
        }

        if let Some(hit) = self.cached(&key) {
            tracing::debug!("Geocode cache hit: {:?}", key);
            return Ok(Some(hit));
        }

        self.gate.wait().await;
        let hit = self.geocoder.geocode(&key).await?;

        if let Some(hit) = &hit {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(key, hit.clone());
            }
        }
        Ok(hit)
    }

    fn cached(&self, key: &str) -> Option<GeocodeHit> {
        self.cache.lock().ok().and_then(|c| c.get(key).cloned())
    }
}
