use chrono::Utc;
use futures::try_join;
use pulse_core::error::{QueryError, StoreError};
use pulse_core::types::{LogFilter, Page, StoredEvent};
use pulse_db::{
    Aggregator, Collection, Condition, DocumentStore, FindOptions, LabelMatch, RangeOptions,
    SeriesFilter, SeriesStore, SortOrder,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

const EVENTS_COLLECTION: &str = "events";

/// Trailing window applied when a time-series query carries no date bounds.
pub const DEFAULT_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: i64,
    pub value: f64,
}

/// One decoded series over the queried window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesInfo {
    #[serde(rename = "type")]
    pub event_type: String,
    pub service: String,
    pub from: i64,
    pub to: i64,
    pub data: Vec<TimeSeriesPoint>,
}

/// Read surface consumed by the HTTP layer: paginated log search,
/// time-series ranges and the per-type distribution.
#[derive(Clone)]
pub struct QueryService {
    events: Collection,
    series: SeriesStore,
}

impl QueryService {
    pub fn new(store: &DocumentStore, series: SeriesStore) -> Self {
        Self {
            events: store.collection(EVENTS_COLLECTION),
            series,
        }
    }

    /// Filtered, paginated event search, newest first. Count and find run
    /// fanned out, not sequentially.
    pub async fn logs(
        &self,
        filter: &LogFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<StoredEvent>, QueryError> {
        let conditions = log_conditions(filter);
        let options = FindOptions {
            sort: Some(("timestamp".to_string(), SortOrder::Desc)),
            skip: u64::from(page) * u64::from(limit),
            limit: Some(u64::from(limit)),
            projection: None,
        };

        let (total, docs) = try_join!(
            self.events.count(&conditions),
            self.events.find(&conditions, &options),
        )?;

        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            let item: StoredEvent =
                serde_json::from_value(doc).map_err(|err| StoreError::JsonDecode {
                    message: err.to_string(),
                })?;
            items.push(item);
        }
        Ok(Page::new(items, total, page, limit))
    }

    /// Bucketed execution-time series for every (type, service) pair the
    /// filter matches. Missing date bounds default to the trailing 24 hours.
    pub async fn time_series(&self, filter: &LogFilter) -> Result<Vec<TimeSeriesInfo>, QueryError> {
        let now = Utc::now().timestamp_millis();
        let from = filter
            .start_date
            .map_or(now - DEFAULT_WINDOW_MS, |date| date.timestamp_millis());
        let to = filter.end_date.map_or(now, |date| date.timestamp_millis());

        let mut conditions = vec![match filter.event_type {
            Some(event_type) => LabelMatch::exact("type", event_type.as_str()),
            None => LabelMatch::any("type"),
        }];
        if let Some(service) = &filter.service {
            conditions.push(LabelMatch::exact("service", service));
        }
        let filters = [SeriesFilter::new(conditions)];

        let options = RangeOptions {
            bucket_ms: 60_000,
            aggregator: Aggregator::Avg,
            with_labels: true,
        };
        let ranges = self.series.range_multi(from, to, &filters, &options).await?;

        Ok(ranges
            .into_iter()
            .map(|range| {
                // Labels are authoritative; fall back to the
                // events:<type>:<service> key shape when they are absent.
                let event_type = range
                    .labels
                    .get("type")
                    .cloned()
                    .or_else(|| range.key.split(':').nth(1).map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                let service = range
                    .labels
                    .get("service")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                TimeSeriesInfo {
                    event_type,
                    service,
                    from,
                    to,
                    data: range
                        .points
                        .into_iter()
                        .map(|(timestamp, value)| TimeSeriesPoint { timestamp, value })
                        .collect(),
                }
            })
            .collect())
    }

    /// Count of stored events per type under the date/service criteria. The
    /// incoming type filter is deliberately not applied: the output is the
    /// per-type breakdown.
    pub async fn type_distribution(
        &self,
        filter: &LogFilter,
    ) -> Result<BTreeMap<String, u64>, QueryError> {
        let conditions = distribution_conditions(filter);
        let groups = self.events.group_count("type", &conditions).await?;
        Ok(groups.into_iter().collect())
    }
}

fn log_conditions(filter: &LogFilter) -> Vec<Condition> {
    let mut conditions = distribution_conditions(filter);
    if let Some(event_type) = filter.event_type {
        conditions.push(Condition::Eq("type".to_string(), json!(event_type.as_str())));
    }
    if let Some(sub_type) = filter.sub_type {
        conditions.push(Condition::Eq(
            "subType".to_string(),
            json!(sub_type.as_str()),
        ));
    }
    conditions
}

fn distribution_conditions(filter: &LogFilter) -> Vec<Condition> {
    let mut conditions = Vec::new();
    if let Some(start) = filter.start_date {
        conditions.push(Condition::TimeGte("timestamp".to_string(), start));
    }
    if let Some(end) = filter.end_date {
        conditions.push(Condition::TimeLte("timestamp".to_string(), end));
    }
    if let Some(service) = &filter.service {
        conditions.push(Condition::Eq("service".to_string(), json!(service)));
    }
    conditions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};
    use pulse_core::types::{Event, EventType};
    use pulse_db::DbHandle;
    use std::collections::HashMap;

    struct Fixture {
        query: QueryService,
        handle: DbHandle,
    }

    fn fixture() -> Fixture {
        let handle = DbHandle::in_memory().unwrap();
        let store = DocumentStore::new(handle.clone());
        let query = QueryService::new(&store, SeriesStore::new(handle.clone()));
        Fixture { query, handle }
    }

    fn stored_event(
        n: usize,
        event_type: EventType,
        service: &str,
        timestamp: DateTime<Utc>,
    ) -> serde_json::Value {
        let event = Event {
            id: format!("evt_{n:026}"),
            event_type,
            sub_type: None,
            timestamp,
            service: service.to_string(),
            request: None,
            response: None,
            execution_time: Some(10),
            metadata: None,
        };
        serde_json::to_value(StoredEvent {
            event,
            received_at: timestamp,
        })
        .unwrap()
    }

    async fn seed_events(fixture: &Fixture, docs: &[serde_json::Value]) {
        let events = DocumentStore::new(fixture.handle.clone()).collection(EVENTS_COLLECTION);
        events.insert_many(docs).await.unwrap();
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_logs_paginate_newest_first() {
        let fixture = fixture();
        let docs: Vec<_> = (0..25)
            .map(|n| {
                stored_event(
                    n,
                    EventType::DbSearch,
                    "service-a",
                    base_time() + Duration::minutes(n as i64),
                )
            })
            .collect();
        seed_events(&fixture, &docs).await;

        let page = fixture.query.logs(&LogFilter::default(), 0, 10).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.pages, 3);
        assert_eq!(page.items.len(), 10);
        assert_eq!(page.items[0].event.id, format!("evt_{:026}", 24));

        let last = fixture.query.logs(&LogFilter::default(), 2, 10).await.unwrap();
        assert_eq!(last.items.len(), 5);
    }

    #[tokio::test]
    async fn test_logs_empty_store_has_zero_pages() {
        let fixture = fixture();
        let page = fixture.query.logs(&LogFilter::default(), 0, 10).await.unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.pages, 0);
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_logs_exact_multiple_has_no_trailing_page() {
        let fixture = fixture();
        let docs: Vec<_> = (0..20)
            .map(|n| stored_event(n, EventType::FileParse, "service-a", base_time()))
            .collect();
        seed_events(&fixture, &docs).await;

        let page = fixture.query.logs(&LogFilter::default(), 0, 10).await.unwrap();
        assert_eq!(page.pages, 2);
    }

    #[tokio::test]
    async fn test_logs_apply_type_service_and_date_conditions() {
        let fixture = fixture();
        let docs = vec![
            stored_event(0, EventType::DbSearch, "service-a", base_time()),
            stored_event(1, EventType::FileParse, "service-a", base_time()),
            stored_event(2, EventType::DbSearch, "service-b", base_time()),
            stored_event(
                3,
                EventType::DbSearch,
                "service-a",
                base_time() + Duration::days(2),
            ),
        ];
        seed_events(&fixture, &docs).await;

        let filter = LogFilter {
            start_date: Some(base_time() - Duration::hours(1)),
            end_date: Some(base_time() + Duration::hours(1)),
            event_type: Some(EventType::DbSearch),
            sub_type: None,
            service: Some("service-a".to_string()),
        };
        let page = fixture.query.logs(&filter, 0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].event.id, format!("evt_{:026}", 0));
    }

    #[tokio::test]
    async fn test_time_series_defaults_to_trailing_day() {
        let fixture = fixture();
        let series = SeriesStore::new(fixture.handle.clone());
        let labels = HashMap::from([
            ("type".to_string(), "DB_SEARCH".to_string()),
            ("service".to_string(), "service-a".to_string()),
        ]);
        series
            .create("events:DB_SEARCH:service-a", 0, &labels)
            .await
            .unwrap();
        series
            .add("events:DB_SEARCH:service-a", None, 42.0)
            .await
            .unwrap();

        let infos = fixture.query.time_series(&LogFilter::default()).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].to - infos[0].from, DEFAULT_WINDOW_MS);
        assert_eq!(infos[0].event_type, "DB_SEARCH");
        assert_eq!(infos[0].service, "service-a");
        assert_eq!(infos[0].data.len(), 1);
        assert!((infos[0].data[0].value - 42.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_time_series_falls_back_to_key_parsing() {
        let fixture = fixture();
        let series = SeriesStore::new(fixture.handle.clone());
        series
            .create("events:FILE_PARSE:service-a", 0, &HashMap::new())
            .await
            .unwrap();
        series
            .add("events:FILE_PARSE:service-a", None, 5.0)
            .await
            .unwrap();

        let infos = fixture.query.time_series(&LogFilter::default()).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].event_type, "FILE_PARSE");
        assert_eq!(infos[0].service, "unknown");
    }

    #[tokio::test]
    async fn test_time_series_service_filter_narrows_series() {
        let fixture = fixture();
        let series = SeriesStore::new(fixture.handle.clone());
        for service in ["service-a", "service-b"] {
            let labels = HashMap::from([
                ("type".to_string(), "DB_SEARCH".to_string()),
                ("service".to_string(), service.to_string()),
            ]);
            let key = format!("events:DB_SEARCH:{service}");
            series.create(&key, 0, &labels).await.unwrap();
            series.add(&key, None, 1.0).await.unwrap();
        }

        let filter = LogFilter {
            service: Some("service-b".to_string()),
            ..LogFilter::default()
        };
        let infos = fixture.query.time_series(&filter).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].service, "service-b");
    }

    #[tokio::test]
    async fn test_distribution_matches_log_totals_and_ignores_type() {
        let fixture = fixture();
        let docs = vec![
            stored_event(0, EventType::DbSearch, "service-a", base_time()),
            stored_event(1, EventType::DbSearch, "service-a", base_time()),
            stored_event(2, EventType::FileParse, "service-a", base_time()),
            stored_event(3, EventType::FetchData, "service-b", base_time()),
        ];
        seed_events(&fixture, &docs).await;

        let filter = LogFilter {
            service: Some("service-a".to_string()),
            // The type filter must not narrow the distribution.
            event_type: Some(EventType::DbSearch),
            ..LogFilter::default()
        };
        let distribution = fixture.query.type_distribution(&filter).await.unwrap();
        assert_eq!(distribution.get("DB_SEARCH"), Some(&2));
        assert_eq!(distribution.get("FILE_PARSE"), Some(&1));
        assert_eq!(distribution.get("FETCH_DATA"), None);

        let no_type = LogFilter {
            service: Some("service-a".to_string()),
            ..LogFilter::default()
        };
        let logs = fixture.query.logs(&no_type, 0, 10).await.unwrap();
        let sum: u64 = distribution.values().sum();
        assert_eq!(sum, logs.total);
    }
}
