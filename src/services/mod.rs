pub mod event_bridge;
pub mod geocoder;
pub mod run_driver;
pub mod sources;
pub mod title_parser;

pub use event_bridge::{EventForwarder, HttpEventSink};
pub use geocoder::{GeocodingService, NominatimGeocoder};
pub use run_driver::{RunDriver, RunSummary};
pub use sources::{SourceAdapter, SourceKind};
