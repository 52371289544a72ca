//! Session fetching
//!
//! The fetcher runs one query against an injected store and reports the
//! result as one of three outcomes. A store failure never propagates past
//! this point: it is logged and surfaced as `FetchOutcome::LoadError`.

use std::fmt::Debug;

use log::{error, info};

use crate::error::HistoryError;
use crate::model::SessionRecord;

/// Number of sessions shown per view
pub const SESSION_PAGE_SIZE: usize = 10;

pub const SESSIONS_COLLECTION: &str = "sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    StartTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Query sent to a session store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuery {
    pub collection: String,
    pub order_by: OrderField,
    pub direction: Direction,
    pub limit: usize,
}

impl SessionQuery {
    /// Most recent sessions first, one page
    pub fn recent() -> Self {
        Self {
            collection: SESSIONS_COLLECTION.to_string(),
            order_by: OrderField::StartTime,
            direction: Direction::Descending,
            limit: SESSION_PAGE_SIZE,
        }
    }
}

/// A source of session records
///
/// Implementations answer a `SessionQuery` in the requested order. The
/// fetcher does not re-sort results.
pub trait SessionStore: Send + Debug {
    fn query(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, HistoryError>;

    /// Human-readable description of the store, used in log output
    fn describe(&self) -> String;
}

impl<S: SessionStore + ?Sized> SessionStore for Box<S> {
    fn query(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, HistoryError> {
        (**self).query(query)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Result of a fetch
#[derive(Debug)]
pub enum FetchOutcome {
    Loaded(Vec<SessionRecord>),
    NoData,
    /// Details go to the log; the display only gets a generic message
    LoadError(String),
}

#[derive(Debug)]
pub struct SessionFetcher<S> {
    store: S,
    query: SessionQuery,
}

impl<S: SessionStore> SessionFetcher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            query: SessionQuery::recent(),
        }
    }

    pub fn fetch_recent(&self) -> FetchOutcome {
        info!("Querying {} for recent sessions", self.store.describe());

        match self.store.query(&self.query) {
            Ok(mut sessions) => {
                if sessions.is_empty() {
                    info!("No sessions found");
                    return FetchOutcome::NoData;
                }
                sessions.truncate(self.query.limit);
                for session in &sessions {
                    info!(
                        "Retrieved session: {} with {} readings",
                        session.id,
                        session.readings.len()
                    );
                }
                FetchOutcome::Loaded(sessions)
            }
            Err(e) => {
                error!("Error getting sessions from {}: {:?}", self.store.describe(), e);
                FetchOutcome::LoadError(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::RawTimestamp;
    use std::sync::Mutex;

    /// In-memory store returning canned results and recording queries
    #[derive(Debug, Default)]
    pub(crate) struct FakeStore {
        pub sessions: Vec<SessionRecord>,
        pub fail: bool,
        pub seen: Mutex<Vec<SessionQuery>>,
    }

    impl SessionStore for FakeStore {
        fn query(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, HistoryError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(query.clone());
            }
            if self.fail {
                return Err(HistoryError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "permission denied",
                )));
            }
            Ok(self.sessions.clone())
        }

        fn describe(&self) -> String {
            "fake store".to_string()
        }
    }

    pub(crate) fn session(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            device_type: "CGM".to_string(),
            start_time: RawTimestamp::Missing,
            readings: Vec::new(),
        }
    }

    #[test]
    fn test_recent_query() {
        let query = SessionQuery::recent();
        assert_eq!(query.collection, "sessions");
        assert_eq!(query.order_by, OrderField::StartTime);
        assert_eq!(query.direction, Direction::Descending);
        assert_eq!(query.limit, 10);
    }

    #[test]
    fn test_fetch_sends_recent_query() {
        let fetcher = SessionFetcher::new(FakeStore::default());
        fetcher.fetch_recent();
        let seen = fetcher.store.seen.lock().unwrap();
        assert_eq!(*seen, vec![SessionQuery::recent()]);
    }

    #[test]
    fn test_no_data_is_not_an_error() {
        let fetcher = SessionFetcher::new(FakeStore::default());
        assert!(matches!(fetcher.fetch_recent(), FetchOutcome::NoData));
    }

    #[test]
    fn test_store_failure_is_load_error() {
        let store = FakeStore {
            fail: true,
            ..FakeStore::default()
        };
        let fetcher = SessionFetcher::new(store);
        match fetcher.fetch_recent() {
            FetchOutcome::LoadError(msg) => assert!(msg.contains("permission denied")),
            other => panic!("expected load error, got {:?}", other),
        }
    }

    #[test]
    fn test_loaded_preserves_order_and_limit() {
        let store = FakeStore {
            sessions: (0..12).map(|i| session(&format!("s{}", i))).collect(),
            ..FakeStore::default()
        };
        let fetcher = SessionFetcher::new(store);
        match fetcher.fetch_recent() {
            FetchOutcome::Loaded(sessions) => {
                assert_eq!(sessions.len(), SESSION_PAGE_SIZE);
                assert_eq!(sessions[0].id, "s0");
                assert_eq!(sessions[9].id, "s9");
            }
            other => panic!("expected sessions, got {:?}", other),
        }
    }

    #[test]
    fn test_boxed_store() {
        let store: Box<dyn SessionStore> = Box::new(FakeStore {
            sessions: vec![session("only")],
            ..FakeStore::default()
        });
        let fetcher = SessionFetcher::new(store);
        assert!(matches!(fetcher.fetch_recent(), FetchOutcome::Loaded(s) if s.len() == 1));
    }
}
