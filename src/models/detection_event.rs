use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EVENT_TYPE: &str = "motion";

/// Body of `POST {api}/api/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub camera: String,
    pub event_type: String,
    pub confidence: f64,
    pub timestamp: String,
}

impl DetectionEvent {
    pub fn new(camera: &str, event_type: Option<&str>, confidence: f64, at: DateTime<Utc>) -> Self {
        Self {
            camera: camera.to_string(),
            event_type: event_type
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_EVENT_TYPE)
                .to_string(),
            confidence,
            timestamp: at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}
