use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/webcamorg";
pub const DEFAULT_SCRAPER_USER_AGENT: &str = "webcam.org-scraper/1.0 (traffic camera aggregator)";
pub const DEFAULT_GEOCODER_USER_AGENT: &str = "webcam.org-scraper/1.0 (contact@webcam.org)";

/// Geographic bounding box in the order the Windy API expects (north, east, south, west).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub east: f64,
    pub south: f64,
    pub west: f64,
}

impl BoundingBox {
    pub const CALIFORNIA: BoundingBox = BoundingBox {
        north: 42.0,
        east: -114.1,
        south: 32.5,
        west: -124.4,
    };

    pub const FLORIDA: BoundingBox = BoundingBox {
        north: 31.0,
        east: -80.0,
        south: 24.5,
        west: -87.6,
    };

    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "california" | "ca" => Some(Self::CALIFORNIA),
            "florida" | "fl" => Some(Self::FLORIDA),
            _ => None,
        }
    }

    /// Parses `"north,east,south,west"`.
    pub fn parse(s: &str) -> AppResult<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| AppError::Config(format!("invalid bbox {:?}: {}", s, e)))?;

        match parts.as_slice() {
            [north, east, south, west] => Ok(Self {
                north: *north,
                east: *east,
                south: *south,
                west: *west,
            }),
            _ => Err(AppError::Config(format!(
                "bbox needs 4 values (north,east,south,west), got {}",
                parts.len()
            ))),
        }
    }

    pub fn to_query_value(&self) -> String {
        format!("{},{},{},{}", self.north, self.east, self.south, self.west)
    }
}

#[derive(Clone, Debug)]
pub struct DotConfig {
    pub fl511_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct WindyConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub bbox: BoundingBox,
    pub max_cams: usize,
    pub page_size: usize,
    pub include_location: bool,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub min_delay: Duration,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub topic_root: String,
    pub objects: Vec<String>,
    pub api_url: String,
    pub api_key: Option<String>,
    pub forward_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl BridgeConfig {
    /// Loads only the bridge settings, so scraper options cannot block it from starting.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(&lookup, key);
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        BridgeConfig {
            mqtt_host: get_or("MQTT_HOST", "mqtt"),
            mqtt_port: parse_or(get("MQTT_PORT"), 1883),
            mqtt_client_id: get_or("MQTT_CLIENT_ID", "webcamorg-integration"),
            topic_root: get_or("MQTT_TOPIC_ROOT", "frigate"),
            objects: get_or("MQTT_OBJECTS", "person,car")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            api_url: get_or("WEBCAMORG_API_URL", "https://api.webcam.org"),
            api_key: get("WEBCAMORG_API_KEY"),
            forward_timeout: Duration::from_secs(parse_or(get("EVENT_FORWARD_TIMEOUT_SECS"), 5)),
            reconnect_delay: Duration::from_secs(parse_or(get("MQTT_RECONNECT_DELAY_SECS"), 5)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub dot: DotConfig,
    pub windy: WindyConfig,
    pub geocoder: GeocoderConfig,
    pub bridge: BridgeConfig,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_blank(&lookup, key);
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let fetch_timeout = Duration::from_secs(parse_or(get("SOURCE_FETCH_TIMEOUT_SECS"), 30));
        let scraper_user_agent = get_or("SCRAPER_USER_AGENT", DEFAULT_SCRAPER_USER_AGENT);

        let bbox = match (get("WINDY_BBOX"), get("WINDY_REGION")) {
            (Some(raw), _) => BoundingBox::parse(&raw)?,
            (None, Some(region)) => BoundingBox::preset(&region)
                .ok_or_else(|| AppError::Config(format!("unknown WINDY_REGION {:?}", region)))?,
            (None, None) => BoundingBox::CALIFORNIA,
        };

        Ok(Config {
            database_url: get_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), 5),
            dot: DotConfig {
                fl511_url: get_or("FL511_URL", "https://fl511.com/map/mapIcons/Cameras"),
                user_agent: scraper_user_agent.clone(),
                timeout: fetch_timeout,
            },
            windy: WindyConfig {
                api_key: get("WINDY_API_KEY"),
                api_base: get_or("WINDY_API_BASE", "https://api.windy.com"),
                bbox,
                max_cams: parse_or(get("WINDY_MAX_CAMS"), 100),
                page_size: parse_or(get("WINDY_PAGE_SIZE"), 50).max(1),
                include_location: parse_bool(get("WINDY_INCLUDE_LOCATION")),
                user_agent: scraper_user_agent,
                timeout: fetch_timeout,
            },
            geocoder: GeocoderConfig {
                base_url: get_or("GEOCODER_URL", "https://nominatim.openstreetmap.org"),
                user_agent: get_or("GEOCODER_USER_AGENT", DEFAULT_GEOCODER_USER_AGENT),
                min_delay: Duration::from_millis(parse_or(get("GEOCODER_MIN_DELAY_MS"), 1100)),
                timeout: Duration::from_secs(30),
            },
            bridge: BridgeConfig::from_lookup(&lookup),
        })
    }

    /// Database URL with credentials masked, for startup logging.
    pub fn database_url_redacted(&self) -> String {
        match (self.database_url.find("://"), self.database_url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => format!(
                "{}://***@{}",
                &self.database_url[..scheme_end],
                &self.database_url[at + 1..]
            ),
            _ => self.database_url.clone(),
        }
    }
}

/// Blank values count as unset.
fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}
