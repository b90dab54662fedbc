use crate::handle::DbHandle;
use crate::util::{decode_json, encode_json, sql_err};
use chrono::Utc;
use pulse_core::error::StoreError;
use std::collections::HashMap;

pub const DEFAULT_BUCKET_MS: i64 = 60_000;

/// How raw points collapse into one bucket value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Avg,
    Min,
    Max,
    Sum,
    Count,
}

impl Aggregator {
    fn sql_fn(self) -> &'static str {
        match self {
            Aggregator::Avg => "AVG",
            Aggregator::Min => "MIN",
            Aggregator::Max => "MAX",
            Aggregator::Sum => "SUM",
            Aggregator::Count => "COUNT",
        }
    }
}

/// One `label=value` or `label=*` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatch {
    pub label: String,
    pub value: LabelValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelValue {
    Any,
    Exact(String),
}

impl LabelMatch {
    pub fn exact(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: LabelValue::Exact(value.to_string()),
        }
    }

    pub fn any(label: &str) -> Self {
        Self {
            label: label.to_string(),
            value: LabelValue::Any,
        }
    }

    pub fn parse(expr: &str) -> Option<Self> {
        let (label, value) = expr.split_once('=')?;
        if label.is_empty() {
            return None;
        }
        Some(match value {
            "*" => Self::any(label),
            exact => Self::exact(label, exact),
        })
    }

    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match &self.value {
            LabelValue::Any => labels.contains_key(&self.label),
            LabelValue::Exact(expected) => labels.get(&self.label) == Some(expected),
        }
    }
}

/// Conditions AND within one filter; filters OR across a list. A filter with
/// no conditions matches every series and stands in for an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesFilter {
    pub conditions: Vec<LabelMatch>,
}

impl SeriesFilter {
    pub fn catch_all() -> Self {
        Self::default()
    }

    pub fn new(conditions: Vec<LabelMatch>) -> Self {
        Self { conditions }
    }

    fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.conditions.iter().all(|condition| condition.matches(labels))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeOptions {
    pub bucket_ms: i64,
    pub aggregator: Aggregator,
    pub with_labels: bool,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            bucket_ms: DEFAULT_BUCKET_MS,
            aggregator: Aggregator::Avg,
            with_labels: true,
        }
    }
}

/// One matching series with its bucketed points, ordered by bucket start.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRange {
    pub key: String,
    pub labels: HashMap<String, String>,
    pub points: Vec<(i64, f64)>,
}

/// Append-only numeric series keyed by an opaque series key, with per-series
/// retention and label-based multi-series range queries.
#[derive(Clone)]
pub struct SeriesStore {
    handle: DbHandle,
}

impl SeriesStore {
    pub fn new(handle: DbHandle) -> Self {
        Self { handle }
    }

    /// Idempotent: creating a series that already exists is a success and
    /// leaves the existing retention and labels untouched.
    pub async fn create(
        &self,
        key: &str,
        retention_ms: i64,
        labels: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        let labels = encode_json(labels)?;
        let conn = self.handle.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO series (key, retention_ms, labels) VALUES (?1, ?2, ?3)",
            (key, retention_ms, &labels),
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Appends a point; out-of-order timestamps are accepted. Points older
    /// than the series retention, measured from the newest point, are purged
    /// on write.
    pub async fn add(
        &self,
        key: &str,
        timestamp_ms: Option<i64>,
        value: f64,
    ) -> Result<(), StoreError> {
        let ts = timestamp_ms.unwrap_or_else(now_ms);
        let conn = self.handle.lock().await;
        conn.execute(
            "INSERT INTO series_points (key, ts_ms, value) VALUES (?1, ?2, ?3)",
            (key, ts, value),
        )
        .map_err(sql_err)?;

        let retention: Option<i64> = conn
            .query_row(
                "SELECT retention_ms FROM series WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })?;
        if let Some(retention) = retention.filter(|retention| *retention > 0) {
            conn.execute(
                "DELETE FROM series_points WHERE key = ?1 AND ts_ms < \
                 (SELECT MAX(ts_ms) FROM series_points WHERE key = ?1) - ?2",
                (key, retention),
            )
            .map_err(sql_err)?;
        }
        Ok(())
    }

    /// Bucketed range query across every series whose labels satisfy one of
    /// `filters`. An empty filter list is replaced with a catch-all filter,
    /// never evaluated empty.
    pub async fn range_multi(
        &self,
        from_ms: i64,
        to_ms: i64,
        filters: &[SeriesFilter],
        options: &RangeOptions,
    ) -> Result<Vec<SeriesRange>, StoreError> {
        let catch_all = [SeriesFilter::catch_all()];
        let effective: &[SeriesFilter] = if filters.is_empty() { &catch_all } else { filters };

        let conn = self.handle.lock().await;
        let mut stmt = conn
            .prepare("SELECT key, labels FROM series ORDER BY key ASC")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql_err)?;

        let mut matched = Vec::new();
        for row in rows {
            let (key, labels_json) = row.map_err(sql_err)?;
            let labels: HashMap<String, String> = decode_json(&labels_json)?;
            if effective.iter().any(|filter| filter.matches(&labels)) {
                matched.push((key, labels));
            }
        }

        let bucket = options.bucket_ms.max(1);
        let sql = format!(
            "SELECT (ts_ms / ?2) * ?2 AS bucket, {}({}) FROM series_points \
             WHERE key = ?1 AND ts_ms >= ?3 AND ts_ms <= ?4 \
             GROUP BY bucket ORDER BY bucket ASC",
            options.aggregator.sql_fn(),
            if options.aggregator == Aggregator::Count {
                "*"
            } else {
                "value"
            },
        );
        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;

        let mut ranges = Vec::new();
        for (key, labels) in matched {
            let rows = stmt
                .query_map((&key, bucket, from_ms, to_ms), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
                })
                .map_err(sql_err)?;
            let mut points = Vec::new();
            for row in rows {
                points.push(row.map_err(sql_err)?);
            }
            ranges.push(SeriesRange {
                key,
                labels: if options.with_labels {
                    labels
                } else {
                    HashMap::new()
                },
                points,
            });
        }
        Ok(ranges)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SeriesStore {
        SeriesStore::new(DbHandle::in_memory().unwrap())
    }

    fn labels(event_type: &str, service: &str) -> HashMap<String, String> {
        HashMap::from([
            ("type".to_string(), event_type.to_string()),
            ("service".to_string(), service.to_string()),
        ])
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let series = store();
        let labels = labels("DB_SEARCH", "service-a");
        series.create("events:DB_SEARCH:service-a", 1000, &labels).await.unwrap();
        series.create("events:DB_SEARCH:service-a", 9999, &labels).await.unwrap();
    }

    #[tokio::test]
    async fn test_bucket_average_over_range() {
        let series = store();
        let key = "events:DB_SEARCH:service-a";
        series.create(key, 0, &labels("DB_SEARCH", "service-a")).await.unwrap();
        series.add(key, Some(10_000), 10.0).await.unwrap();
        series.add(key, Some(20_000), 30.0).await.unwrap();
        series.add(key, Some(70_000), 100.0).await.unwrap();

        let ranges = series
            .range_multi(0, 120_000, &[], &RangeOptions::default())
            .await
            .unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].points, vec![(0, 20.0), (60_000, 100.0)]);
    }

    #[tokio::test]
    async fn test_out_of_order_points_are_accepted() {
        let series = store();
        let key = "events:FILE_PARSE:service-a";
        series.create(key, 0, &labels("FILE_PARSE", "service-a")).await.unwrap();
        series.add(key, Some(50_000), 2.0).await.unwrap();
        series.add(key, Some(10_000), 4.0).await.unwrap();

        let ranges = series
            .range_multi(0, 60_000, &[], &RangeOptions::default())
            .await
            .unwrap();
        assert_eq!(ranges[0].points, vec![(0, 3.0)]);
    }

    #[tokio::test]
    async fn test_label_filters_or_across_and_within() {
        let series = store();
        series
            .create("events:DB_SEARCH:service-a", 0, &labels("DB_SEARCH", "service-a"))
            .await
            .unwrap();
        series
            .create("events:FILE_PARSE:service-a", 0, &labels("FILE_PARSE", "service-a"))
            .await
            .unwrap();
        series
            .create("events:DB_SEARCH:service-b", 0, &labels("DB_SEARCH", "service-b"))
            .await
            .unwrap();

        // type=DB_SEARCH AND service=service-a, OR type=FILE_PARSE
        let filters = [
            SeriesFilter::new(vec![
                LabelMatch::exact("type", "DB_SEARCH"),
                LabelMatch::exact("service", "service-a"),
            ]),
            SeriesFilter::new(vec![LabelMatch::exact("type", "FILE_PARSE")]),
        ];
        let ranges = series
            .range_multi(0, 1, &filters, &RangeOptions::default())
            .await
            .unwrap();
        let keys: Vec<_> = ranges.iter().map(|range| range.key.as_str()).collect();
        assert_eq!(keys, vec!["events:DB_SEARCH:service-a", "events:FILE_PARSE:service-a"]);
    }

    #[tokio::test]
    async fn test_wildcard_label_requires_presence() {
        let series = store();
        series
            .create("events:DB_SEARCH:service-a", 0, &labels("DB_SEARCH", "service-a"))
            .await
            .unwrap();
        series
            .create("unrelated", 0, &HashMap::new())
            .await
            .unwrap();

        let filters = [SeriesFilter::new(vec![LabelMatch::any("type")])];
        let ranges = series
            .range_multi(0, 1, &filters, &RangeOptions::default())
            .await
            .unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].key, "events:DB_SEARCH:service-a");
    }

    #[tokio::test]
    async fn test_retention_purges_old_points_on_write() {
        let series = store();
        let key = "events:DB_SEARCH:service-a";
        series.create(key, 1_000, &labels("DB_SEARCH", "service-a")).await.unwrap();
        series.add(key, Some(0), 1.0).await.unwrap();
        series.add(key, Some(5_000), 2.0).await.unwrap();

        let ranges = series
            .range_multi(0, 10_000, &[], &RangeOptions::default())
            .await
            .unwrap();
        assert_eq!(ranges[0].points, vec![(0, 2.0)]);
    }

    #[tokio::test]
    async fn test_parse_label_expressions() {
        assert_eq!(
            LabelMatch::parse("type=DB_SEARCH"),
            Some(LabelMatch::exact("type", "DB_SEARCH"))
        );
        assert_eq!(LabelMatch::parse("type=*"), Some(LabelMatch::any("type")));
        assert_eq!(LabelMatch::parse("no-equals"), None);
    }
}
