//! Source adapters: one per upstream camera feed.
//!
//! Every adapter fetches a raw JSON payload and normalizes it into
//! [`CameraCandidate`]s. The run driver treats all of them the same way.

pub mod fields;
pub mod florida_dot;
pub mod windy;

pub use florida_dot::FloridaDotAdapter;
pub use windy::WindyAdapter;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::CameraCandidate;

/// How an adapter's records are written to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One statement and one commit for the whole fetched set.
    Bulk,
    /// One transaction per record; a failed record does not affect the others.
    PerRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page_size: usize,
    pub max_total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn single() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingField(&'static str),
    InvalidField { field: &'static str, value: String },
    ZeroCoordinate,
    NotAnObject,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingField(field) => write!(f, "missing field {}", field),
            SkipReason::InvalidField { field, value } => {
                write!(f, "invalid {} value {:?}", field, value)
            }
            SkipReason::ZeroCoordinate => write!(f, "zero coordinate"),
            SkipReason::NotAnObject => write!(f, "item is not an object"),
        }
    }
}

/// Result of normalizing one fetched payload.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub candidates: Vec<CameraCandidate>,
    /// Items present in the payload before any filtering; drives pagination.
    pub raw_count: usize,
    pub skipped: usize,
}

impl NormalizedBatch {
    /// Records a skipped item with the identifier it was found under.
    pub fn skip(&mut self, source: &str, item_id: &str, reason: SkipReason) {
        if reason == SkipReason::ZeroCoordinate {
            tracing::debug!(source, item = item_id, "Skipped camera: {}", reason);
        } else {
            tracing::warn!(source, item = item_id, "Skipped camera: {}", reason);
        }
        self.skipped += 1;
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry `source` value written for every record of this adapter.
    fn source(&self) -> &str;

    fn write_mode(&self) -> WriteMode;

    /// `None` for single-request sources.
    fn pagination(&self) -> Option<Pagination> {
        None
    }

    async fn fetch(&self, page: PageRequest) -> AppResult<Value>;

    fn normalize(&self, raw: &Value) -> NormalizedBatch;
}

/// Unwraps a bare array or an object keyed by one of `keys`.
pub fn extract_items<'a>(raw: &'a Value, keys: &[&str]) -> &'a [Value] {
    match raw {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => keys
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

/// Drops items past `max` from a bare array or from the arrays of an envelope object.
/// Returns how many were dropped.
pub fn cap_items(raw: &mut Value, max: usize) -> usize {
    fn cap(items: &mut Vec<Value>, max: usize) -> usize {
        let dropped = items.len().saturating_sub(max);
        items.truncate(max);
        dropped
    }

    match raw {
        Value::Array(items) => cap(items, max),
        Value::Object(map) => map
            .values_mut()
            .filter_map(Value::as_array_mut)
            .map(|items| cap(items, max))
            .sum(),
        _ => 0,
    }
}

/// Known sources, buildable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    FloridaDot,
    Windy,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::FloridaDot, SourceKind::Windy];

    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::FloridaDot => florida_dot::SOURCE,
            SourceKind::Windy => windy::SOURCE,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "dot_fl" | "fl" | "florida" => Some(SourceKind::FloridaDot),
            "windy" => Some(SourceKind::Windy),
            _ => None,
        }
    }

    /// Builds the adapter. `Ok(None)` when a required credential is missing.
    pub fn build(&self, config: &Config) -> AppResult<Option<Box<dyn SourceAdapter>>> {
        match self {
            SourceKind::FloridaDot => Ok(Some(Box::new(FloridaDotAdapter::new(&config.dot)?))),
            SourceKind::Windy => match WindyAdapter::new(&config.windy) {
                Ok(adapter) => Ok(Some(Box::new(adapter))),
                Err(AppError::Config(msg)) => {
                    tracing::warn!("Windy source disabled: {}", msg);
                    Ok(None)
                }
                Err(e) => Err(e),
            },
        }
    }
}

/// Resolves a command-line selection (`all` or a comma-separated list) into source kinds.
pub fn select_sources(selection: &str) -> AppResult<Vec<SourceKind>> {
    let selection = selection.trim();
    if selection.is_empty() || selection.eq_ignore_ascii_case("all") {
        return Ok(SourceKind::ALL.to_vec());
    }

    selection
        .split(',')
        .map(|name| {
            SourceKind::from_name(name)
                .ok_or_else(|| AppError::InvalidInput(format!("unknown source {:?}", name.trim())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_items_envelopes() {
        let bare = json!([{"id": 1}, {"id": 2}]);
        let data = json!({"data": [{"id": 1}, {"id": 2}]});
        let cameras = json!({"cameras": [{"id": 1}, {"id": 2}]});
        let keys = ["cameras", "data"];

        assert_eq!(extract_items(&bare, &keys).len(), 2);
        assert_eq!(extract_items(&data, &keys), extract_items(&bare, &keys));
        assert_eq!(extract_items(&cameras, &keys), extract_items(&bare, &keys));
        assert!(extract_items(&json!({"other": []}), &keys).is_empty());
        assert!(extract_items(&json!("text"), &keys).is_empty());
    }

    #[test]
    fn test_cap_items() {
        let mut bare = json!([1, 2, 3]);
        assert_eq!(cap_items(&mut bare, 2), 1);
        assert_eq!(bare, json!([1, 2]));

        let mut wrapped = json!({"total": 9, "webcams": [1, 2, 3, 4]});
        assert_eq!(cap_items(&mut wrapped, 1), 3);
        assert_eq!(wrapped, json!({"total": 9, "webcams": [1]}));

        let mut short = json!({"data": [1]});
        assert_eq!(cap_items(&mut short, 5), 0);
    }

    #[test]
    fn test_select_sources() {
        assert_eq!(select_sources("all").unwrap(), SourceKind::ALL.to_vec());
        assert_eq!(
            select_sources("windy, dot_fl").unwrap(),
            vec![SourceKind::Windy, SourceKind::FloridaDot]
        );
        assert!(select_sources("dot_tx").is_err());
    }

    #[test]
    fn test_windy_disabled_without_key() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(SourceKind::Windy.build(&config).unwrap().is_none());
        let fl = SourceKind::FloridaDot.build(&config).unwrap().unwrap();
        assert_eq!(fl.source(), "dot_fl");
        assert_eq!(fl.write_mode(), WriteMode::Bulk);
    }
}
