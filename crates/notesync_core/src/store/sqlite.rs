//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist collections as JSON documents in the `documents` table.
//! - Serve equality filters through `json_extract` on top-level fields.
//!
//! # Invariants
//! - One connection per store, guarded by a mutex that also orders
//!   notifications after the mutation that caused them.
//! - Listeners only observe writes made through this store instance.
//!
//! # See also
//! - `db::migrations` for the table layout.

use super::hub::{ListenerHub, Subscription};
use super::{
    new_record_id, validate_request, validate_segment, Query, RemoteStore, StoreError,
    StoreRecord, StoreResult,
};
use crate::db::{open_db, open_db_in_memory};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Document store persisted in a local SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    hub: ListenerHub,
}

impl SqliteStore {
    /// Opens or creates the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            hub: ListenerHub::new(),
        }
    }

    /// Number of live listeners currently registered.
    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite store lock poisoned".to_string()))
    }
}

impl RemoteStore for SqliteStore {
    fn generate_id(&self, collection: &str) -> StoreResult<String> {
        validate_segment(collection)?;
        Ok(new_record_id())
    }

    fn write(&self, collection: &str, id: &str, body: Value) -> StoreResult<()> {
        validate_segment(collection)?;
        validate_segment(id)?;
        let encoded = serde_json::to_string(&body)?;
        let conn = self.lock()?;

        let previous = load_body(&conn, collection, id)?;
        conn.execute(
            "INSERT INTO documents (collection, id, body)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![collection, id, encoded],
        )?;
        debug!("event=store_write module=store status=ok backend=sqlite collection={collection}");

        self.hub
            .notify(collection, id, previous.as_ref(), Some(&body), |query| {
                evaluate(&conn, collection, query)
            });
        Ok(())
    }

    fn remove(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_segment(collection)?;
        validate_segment(id)?;
        let conn = self.lock()?;

        let previous = load_body(&conn, collection, id)?;
        if previous.is_none() {
            return Ok(());
        }
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
            params![collection, id],
        )?;
        debug!("event=store_remove module=store status=ok backend=sqlite collection={collection}");

        self.hub
            .notify(collection, id, previous.as_ref(), None, |query| {
                evaluate(&conn, collection, query)
            });
        Ok(())
    }

    fn read_once(&self, collection: &str, query: &Query) -> StoreResult<Vec<StoreRecord>> {
        validate_request(collection, query)?;
        let conn = self.lock()?;
        evaluate(&conn, collection, query)
    }

    fn subscribe(&self, collection: &str, query: &Query) -> StoreResult<Subscription> {
        validate_request(collection, query)?;
        let conn = self.lock()?;
        let initial = evaluate(&conn, collection, query)?;
        Ok(self.hub.register(collection, query, Ok(initial)))
    }
}

fn load_body(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<Value>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND id = ?2;",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;
    match body {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

fn evaluate(conn: &Connection, collection: &str, query: &Query) -> StoreResult<Vec<StoreRecord>> {
    let mut rows_out = Vec::new();
    match query {
        Query::Record(id) => {
            if let Some(body) = load_body(conn, collection, id)? {
                rows_out.push(StoreRecord {
                    id: id.clone(),
                    body,
                });
            }
        }
        Query::Equals { field, value } => {
            let json_path = format!("$.\"{field}\"");
            let mut stmt = conn.prepare_cached(
                "SELECT id, body
                 FROM documents
                 WHERE collection = ?1
                   AND json_type(body, ?2) = 'text'
                   AND json_extract(body, ?2) = ?3
                 ORDER BY id ASC;",
            )?;
            let mut rows = stmt.query(params![collection, json_path, value])?;
            while let Some(row) = rows.next()? {
                let text: String = row.get("body")?;
                rows_out.push(StoreRecord {
                    id: row.get("id")?,
                    body: serde_json::from_str(&text)?,
                });
            }
        }
    }
    Ok(rows_out)
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::store::{Query, RemoteStore};
    use serde_json::json;

    #[test]
    fn equals_filter_ignores_non_string_values() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.write("notes", "a", json!({"userId": "7"})).unwrap();
        store.write("notes", "b", json!({"userId": 7})).unwrap();

        let rows = store.read_once("notes", &Query::equals("userId", "7")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a");
    }

    #[test]
    fn write_overwrites_whole_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .write("notes", "a", json!({"noteTitle": "t", "noteDesc": "d"}))
            .unwrap();
        store.write("notes", "a", json!({"noteTitle": "t2"})).unwrap();

        let rows = store.read_once("notes", &Query::record("a")).unwrap();
        assert_eq!(rows[0].body, json!({"noteTitle": "t2"}));
    }
}
