use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::event::{EventSubType, EventType};

/// Optional criteria shared by the query and report surfaces.
///
/// Date bounds are inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub event_type: Option<EventType>,
    pub sub_type: Option<EventSubType>,
    pub service: Option<String>,
}
