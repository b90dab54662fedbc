pub mod emitter;
pub mod ingest;

pub use emitter::EventEmitter;
pub use ingest::{EVENTS_COLLECTION, EventIngestor};

use pulse_core::types::EventType;

/// Metric points and cached event bodies both live for seven days.
pub const RETENTION_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Series key under which metric points for one (type, service) pair live.
pub fn series_key(event_type: EventType, service: &str) -> String {
    format!("events:{event_type}:{service}")
}

/// Cache key for the full body of one event.
pub fn cache_key(id: &str) -> String {
    format!("event:{id}")
}
