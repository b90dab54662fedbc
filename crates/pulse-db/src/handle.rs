use crate::schema;
use crate::util::sql_err;
use pulse_core::error::StoreError;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// One durable storage connection per process, shared by every adapter.
///
/// Constructed once at process init and passed by reference to the adapters
/// that need it; dropping the last clone closes the connection.
#[derive(Clone)]
pub struct DbHandle {
    conn: Arc<Mutex<Connection>>,
}

impl DbHandle {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = schema::open_and_migrate(path).map_err(sql_err)?;
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, mainly for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = schema::with_test_db().map_err(sql_err)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
