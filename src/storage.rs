//! SQLite storage for session documents
//!
//! Documents are kept verbatim so timestamps keep whatever shape the
//! recorder wrote; only the resolved start time is extracted for ordering.

use std::fmt;
use std::path::Path;

use log::{debug, info, warn};
use rusqlite::{params, Connection, Result};
use serde_json::Value;

use crate::error::HistoryError;
use crate::fetch::{Direction, OrderField, SessionQuery, SessionStore, SESSIONS_COLLECTION};
use crate::model::SessionRecord;
use crate::snapshot::SessionDocument;
use crate::timestamp::TimestampNormalizer;

/// Outcome of a bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// SQLite database of session documents
pub struct SqliteStore {
    conn: Connection,
    description: String,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("description", &self.description)
            .finish()
    }
}

impl SqliteStore {
    /// Create or open a database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let description = format!("sqlite: {}", path.as_ref().display());
        let conn = Connection::open(path)?;
        Self::with_connection(conn, description)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, "sqlite: memory".to_string())
    }

    fn with_connection(conn: Connection, description: String) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                start_epoch_ms INTEGER,
                device_type TEXT NOT NULL,
                reading_count INTEGER NOT NULL,
                document TEXT NOT NULL,
                imported_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_start
                ON sessions(start_epoch_ms);",
        )?;

        Ok(Self { conn, description })
    }

    /// Insert a session, ignoring duplicates by id. Returns whether a row
    /// was added.
    pub fn insert_session(
        &self,
        session: &SessionRecord,
        document: &Value,
        normalizer: &TimestampNormalizer,
    ) -> std::result::Result<bool, HistoryError> {
        let start_epoch_ms = match normalizer.resolve(&session.start_time) {
            Ok(instant) => Some(instant.timestamp_millis()),
            Err(e) => {
                warn!("Session {} has no usable start time ({}); it will sort last", session.id, e);
                None
            }
        };

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO sessions (id, start_epoch_ms, device_type, reading_count, document)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                start_epoch_ms,
                session.device_type,
                session.readings.len() as i64,
                serde_json::to_string(document)?,
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Bulk import documents, skipping duplicates and undecodable entries
    pub fn import_documents(
        &self,
        documents: &[SessionDocument],
        normalizer: &TimestampNormalizer,
    ) -> std::result::Result<ImportSummary, HistoryError> {
        let mut summary = ImportSummary::default();

        for entry in documents {
            let session = match SessionRecord::from_document(entry.key.as_deref(), &entry.document) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Skipping document: {}", e);
                    summary.invalid += 1;
                    continue;
                }
            };

            let mut document = entry.document.clone();
            // Keep the id with the document so re-reading does not need the key
            if let Value::Object(map) = &mut document {
                map.entry("id").or_insert_with(|| Value::String(session.id.clone()));
            }

            if self.insert_session(&session, &document, normalizer)? {
                summary.imported += 1;
            } else {
                debug!("Session {} already stored", session.id);
                summary.duplicates += 1;
            }
        }

        info!(
            "Imported {} sessions ({} duplicates, {} invalid)",
            summary.imported, summary.duplicates, summary.invalid
        );
        Ok(summary)
    }

    /// Get total session count
    pub fn count(&self) -> Result<i64> {
        self.conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
    }

    fn load_page(&self, query: &SessionQuery) -> std::result::Result<Vec<SessionRecord>, HistoryError> {
        let sql = match (query.order_by, query.direction) {
            (OrderField::StartTime, Direction::Descending) => {
                "SELECT id, document FROM sessions
                 ORDER BY start_epoch_ms IS NULL, start_epoch_ms DESC, id
                 LIMIT ?1"
            }
            (OrderField::StartTime, Direction::Ascending) => {
                "SELECT id, document FROM sessions
                 ORDER BY start_epoch_ms IS NULL, start_epoch_ms ASC, id
                 LIMIT ?1"
            }
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![query.limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>>>()?;

        let mut sessions = Vec::with_capacity(rows.len());
        for (id, text) in rows {
            let decoded = serde_json::from_str::<Value>(&text)
                .map_err(HistoryError::from)
                .and_then(|document| SessionRecord::from_document(Some(&id), &document));
            match decoded {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Stored session {} could not be decoded: {}", id, e),
            }
        }
        Ok(sessions)
    }
}

impl SessionStore for SqliteStore {
    fn query(&self, query: &SessionQuery) -> std::result::Result<Vec<SessionRecord>, HistoryError> {
        if query.collection != SESSIONS_COLLECTION {
            debug!("No collection named {}", query.collection);
            return Ok(Vec::new());
        }
        self.load_page(query)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::{DisplayFormat, DisplayZone};
    use serde_json::json;

    fn normalizer() -> TimestampNormalizer {
        TimestampNormalizer::new(DisplayFormat::default().with_zone(DisplayZone::utc()))
    }

    fn entry(key: &str, start: Value) -> SessionDocument {
        SessionDocument {
            key: Some(key.to_string()),
            document: json!({"deviceType": "CGM", "startTime": start, "readings": []}),
        }
    }

    #[test]
    fn test_query_orders_by_start_descending() {
        let store = SqliteStore::open_in_memory().unwrap();
        let docs = vec![
            entry("old", json!({"seconds": 1600000000})),
            entry("unknown", json!("not-a-date")),
            entry("new", json!({"_seconds": 1700000000})),
            entry("middle", json!("2022-06-01T00:00:00Z")),
        ];
        store.import_documents(&docs, &normalizer()).unwrap();

        let ids: Vec<String> = store
            .query(&SessionQuery::recent())
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["new", "middle", "old", "unknown"]);

        let mut ascending = SessionQuery::recent();
        ascending.direction = Direction::Ascending;
        let first = &store.query(&ascending).unwrap()[0];
        assert_eq!(first.id, "old");
    }

    #[test]
    fn test_query_respects_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let docs: Vec<_> = (0..15)
            .map(|i| entry(&format!("s{:02}", i), json!({"seconds": 1700000000 + i})))
            .collect();
        store.import_documents(&docs, &normalizer()).unwrap();

        let sessions = store.query(&SessionQuery::recent()).unwrap();
        assert_eq!(sessions.len(), 10);
        assert_eq!(sessions[0].id, "s14");
    }

    #[test]
    fn test_import_skips_duplicates_and_invalid() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut docs = vec![entry("a", json!({"seconds": 1})), entry("a", json!({"seconds": 2}))];
        docs.push(SessionDocument {
            key: Some("bad".to_string()),
            document: json!({"readings": "none recorded"}),
        });

        let summary = store.import_documents(&docs, &normalizer()).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 1,
                duplicates: 1,
                invalid: 1
            }
        );
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_timestamp_shapes_survive_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .import_documents(&[entry("k", json!({"_seconds": 1700000000}))], &normalizer())
                .unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        let sessions = store.query(&SessionQuery::recent()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "k");
        assert_eq!(
            sessions[0].start_time,
            crate::model::RawTimestamp::Document(json!({"_seconds": 1700000000}))
        );
    }

    #[test]
    fn test_other_collection_is_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .import_documents(&[entry("a", json!({"seconds": 1}))], &normalizer())
            .unwrap();
        let mut query = SessionQuery::recent();
        query.collection = "glucose_readings".to_string();
        assert!(store.query(&query).unwrap().is_empty());
    }
}
