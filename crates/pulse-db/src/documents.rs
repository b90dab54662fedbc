use crate::handle::DbHandle;
use crate::util::{decode_json, encode_json, sql_err, to_rfc3339};
use chrono::{DateTime, Utc};
use pulse_core::error::StoreError;
use serde_json::Value;
use tracing::warn;

/// Documents land in batches of this size; a failure inside one batch leaves
/// earlier batches committed.
const INSERT_CHUNK: usize = 1000;

/// One conjunctive condition on a top-level document field. The `Time`
/// variants compare RFC 3339 fields as instants, so mixed sub-second
/// precision cannot skew the bounds.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    TimeGte(String, DateTime<Utc>),
    TimeLte(String, DateTime<Utc>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub skip: u64,
    pub limit: Option<u64>,
    pub projection: Option<Vec<String>>,
}

/// Durable JSON document store. Collections are name-scoped views over one
/// table; documents are immutable once inserted.
#[derive(Clone)]
pub struct DocumentStore {
    handle: DbHandle,
}

impl DocumentStore {
    pub fn new(handle: DbHandle) -> Self {
        Self { handle }
    }

    pub fn collection(&self, name: &str) -> Collection {
        Collection {
            handle: self.handle.clone(),
            name: name.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Collection {
    handle: DbHandle,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn insert_one(&self, doc: &Value) -> Result<(), StoreError> {
        let body = encode_document(doc)?;
        let conn = self.handle.lock().await;
        conn.execute(
            "INSERT INTO documents (collection, body) VALUES (?1, ?2)",
            (&self.name, &body),
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Unordered batch insert in fixed-size chunks. An invalid document is
    /// logged and skipped without blocking the rest of its chunk; a storage
    /// failure aborts the current chunk and leaves earlier chunks committed.
    /// Returns the best-effort inserted count.
    pub async fn insert_many(&self, docs: &[Value]) -> Result<u64, StoreError> {
        let mut inserted = 0u64;
        for chunk in docs.chunks(INSERT_CHUNK) {
            let conn = self.handle.lock().await;
            conn.execute_batch("BEGIN IMMEDIATE").map_err(sql_err)?;
            let mut in_chunk = 0u64;
            for doc in chunk {
                let body = match encode_document(doc) {
                    Ok(body) => body,
                    Err(err) => {
                        warn!("skipping invalid document in batch: {err}");
                        continue;
                    }
                };
                let result = conn.execute(
                    "INSERT INTO documents (collection, body) VALUES (?1, ?2)",
                    (&self.name, &body),
                );
                match result {
                    Ok(_) => in_chunk += 1,
                    Err(err) => {
                        conn.execute_batch("ROLLBACK").map_err(sql_err)?;
                        return Err(sql_err(err));
                    }
                }
            }
            conn.execute_batch("COMMIT").map_err(sql_err)?;
            inserted += in_chunk;
        }
        Ok(inserted)
    }

    pub async fn find(
        &self,
        conditions: &[Condition],
        options: &FindOptions,
    ) -> Result<Vec<Value>, StoreError> {
        let (where_sql, mut params) = build_where(&self.name, conditions);
        let mut sql = format!("SELECT body FROM documents{where_sql}");

        if let Some((field, order)) = &options.sort {
            let direction = match order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {direction}", extract_expr(field)));
        }
        let limit = options.limit.map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let skip = i64::try_from(options.skip).unwrap_or(i64::MAX);
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(limit.into());
        params.push(skip.into());

        let conn = self.handle.lock().await;
        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                row.get::<_, String>(0)
            })
            .map_err(sql_err)?;

        let mut docs = Vec::new();
        for row in rows {
            let body = row.map_err(sql_err)?;
            let mut doc: Value = decode_json(&body)?;
            if let Some(fields) = &options.projection {
                doc = project(doc, fields);
            }
            docs.push(doc);
        }
        Ok(docs)
    }

    pub async fn find_one(&self, conditions: &[Condition]) -> Result<Option<Value>, StoreError> {
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        Ok(self.find(conditions, &options).await?.into_iter().next())
    }

    pub async fn count(&self, conditions: &[Condition]) -> Result<u64, StoreError> {
        let (where_sql, params) = build_where(&self.name, conditions);
        let sql = format!("SELECT COUNT(*) FROM documents{where_sql}");
        let conn = self.handle.lock().await;
        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let count: i64 = stmt
            .query_row(rusqlite::params_from_iter(params), |row| row.get(0))
            .map_err(sql_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Group-by count aggregation over one top-level field. Documents
    /// missing the field are not counted.
    pub async fn group_count(
        &self,
        field: &str,
        conditions: &[Condition],
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let (where_sql, params) = build_where(&self.name, conditions);
        let expr = extract_expr(field);
        let sql = format!(
            "SELECT {expr} AS grp, COUNT(*) FROM documents{where_sql} GROUP BY grp ORDER BY grp ASC"
        );
        let conn = self.handle.lock().await;
        let mut stmt = conn.prepare(&sql).map_err(sql_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(sql_err)?;

        let mut groups = Vec::new();
        for row in rows {
            let (group, count) = row.map_err(sql_err)?;
            if let Some(group) = group {
                groups.push((group, u64::try_from(count).unwrap_or(0)));
            }
        }
        Ok(groups)
    }
}

fn encode_document(doc: &Value) -> Result<String, StoreError> {
    if !doc.is_object() {
        return Err(StoreError::InvalidDocument {
            message: format!("expected an object, got {doc}"),
        });
    }
    encode_json(doc)
}

fn extract_expr(field: &str) -> String {
    format!("json_extract(body, '$.{field}')")
}

fn build_where(
    collection: &str,
    conditions: &[Condition],
) -> (String, Vec<rusqlite::types::Value>) {
    let mut sql = String::from(" WHERE collection = ?");
    let mut params: Vec<rusqlite::types::Value> = vec![collection.to_string().into()];
    for condition in conditions {
        match condition {
            Condition::Eq(field, value) => {
                sql.push_str(&format!(" AND {} = ?", extract_expr(field)));
                params.push(bind_value(value));
            }
            Condition::Gte(field, value) => {
                sql.push_str(&format!(" AND {} >= ?", extract_expr(field)));
                params.push(bind_value(value));
            }
            Condition::Lte(field, value) => {
                sql.push_str(&format!(" AND {} <= ?", extract_expr(field)));
                params.push(bind_value(value));
            }
            Condition::TimeGte(field, instant) => {
                sql.push_str(&format!(
                    " AND julianday({}) >= julianday(?)",
                    extract_expr(field)
                ));
                params.push(to_rfc3339(instant).into());
            }
            Condition::TimeLte(field, instant) => {
                sql.push_str(&format!(
                    " AND julianday({}) <= julianday(?)",
                    extract_expr(field)
                ));
                params.push(to_rfc3339(instant).into());
            }
        }
    }
    (sql, params)
}

fn bind_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::String(text) => text.clone().into(),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                int.into()
            } else {
                number.as_f64().unwrap_or(0.0).into()
            }
        }
        Value::Bool(flag) => i64::from(*flag).into(),
        other => other.to_string().into(),
    }
}

fn project(doc: Value, fields: &[String]) -> Value {
    let Value::Object(mut map) = doc else {
        return doc;
    };
    map.retain(|key, _| fields.iter().any(|field| field == key));
    Value::Object(map)
}
