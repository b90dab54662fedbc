use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operational categories a producer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ApiRequest,
    FetchData,
    FileDownload,
    FileUpload,
    FileParse,
    DbSearch,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::ApiRequest,
        EventType::FetchData,
        EventType::FileDownload,
        EventType::FileUpload,
        EventType::FileParse,
        EventType::DbSearch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ApiRequest => "API_REQUEST",
            EventType::FetchData => "FETCH_DATA",
            EventType::FileDownload => "FILE_DOWNLOAD",
            EventType::FileUpload => "FILE_UPLOAD",
            EventType::FileParse => "FILE_PARSE",
            EventType::DbSearch => "DB_SEARCH",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle marker within one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSubType {
    Request,
    Response,
    Error,
}

impl EventSubType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSubType::Request => "REQUEST",
            EventSubType::Response => "RESPONSE",
            EventSubType::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for EventSubType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical telemetry event as it travels over the bus.
///
/// `request`, `response` and `metadata` are deliberately schema-less: each
/// event type carries its own shape and consumers treat them as opaque blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<EventSubType>,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Partial event handed to the emitter; missing fields are filled at
/// emission time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDraft {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub sub_type: Option<EventSubType>,
    pub timestamp: Option<DateTime<Utc>>,
    pub service: Option<String>,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub execution_time: Option<u64>,
    pub metadata: Option<Value>,
}

/// Durable record created once at ingestion, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    #[serde(flatten)]
    pub event: Event,
    pub received_at: DateTime<Utc>,
}
