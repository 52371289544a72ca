//! JSON snapshot store
//!
//! Reads session documents from an exported JSON file. Two layouts are
//! accepted: an array of documents, or an object keyed by document id (as
//! collection exports are written). Either may be wrapped in a top-level
//! `"sessions"` or `"glucose_sessions"` member.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::Value;

use crate::error::HistoryError;
use crate::fetch::{Direction, OrderField, SessionQuery, SessionStore, SESSIONS_COLLECTION};
use crate::model::SessionRecord;
use crate::timestamp::TimestampNormalizer;

/// A raw document with the key it was stored under, if any
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDocument {
    pub key: Option<String>,
    pub document: Value,
}

/// Top-level members an export may be wrapped in
const EXPORT_WRAPPERS: [&str; 2] = [SESSIONS_COLLECTION, "glucose_sessions"];

/// A keyed entry needs at least one of these to count as a session
const SESSION_MEMBERS: [&str; 5] = ["deviceType", "device_type", "startTime", "start_time", "readings"];

fn is_session_document(document: &Value) -> bool {
    document
        .as_object()
        .is_some_and(|map| SESSION_MEMBERS.iter().any(|member| map.contains_key(*member)))
}

/// Split an export into individual documents
pub fn parse_documents(export: Value) -> Result<Vec<SessionDocument>, HistoryError> {
    let export = match export {
        Value::Object(mut map) => match EXPORT_WRAPPERS.into_iter().find(|key| map.contains_key(*key)) {
            Some(wrapper) => map.remove(wrapper).unwrap_or(Value::Null),
            None => Value::Object(map),
        },
        other => other,
    };

    match export {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(|document| SessionDocument { key: None, document })
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .filter_map(|(key, document)| {
                if is_session_document(&document) {
                    Some(SessionDocument {
                        key: Some(key),
                        document,
                    })
                } else {
                    warn!("Skipping '{}': not a session document", key);
                    None
                }
            })
            .collect()),
        other => Err(HistoryError::InvalidDocument(format!(
            "expected an array or object of sessions, found {}",
            type_name(&other)
        ))),
    }
}

/// Read and split an export file
pub fn read_documents<P: AsRef<Path>>(path: P) -> Result<Vec<SessionDocument>, HistoryError> {
    let content = fs::read_to_string(path)?;
    parse_documents(serde_json::from_str(&content)?)
}

/// A session store backed by an exported JSON file
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    normalizer: TimestampNormalizer,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P, normalizer: TimestampNormalizer) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            normalizer,
        }
    }
}

impl SessionStore for SnapshotStore {
    fn query(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, HistoryError> {
        if query.collection != SESSIONS_COLLECTION {
            return Ok(Vec::new());
        }

        let mut keyed: Vec<(Option<i64>, SessionRecord)> = read_documents(&self.path)?
            .into_iter()
            .filter_map(|entry| {
                match SessionRecord::from_document(entry.key.as_deref(), &entry.document) {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!("Skipping document in {}: {}", self.path.display(), e);
                        None
                    }
                }
            })
            .map(|session| {
                let start = self
                    .normalizer
                    .resolve(&session.start_time)
                    .ok()
                    .map(|instant| instant.timestamp_millis());
                (start, session)
            })
            .collect();

        // Unresolvable start times sort last in either direction
        match (query.order_by, query.direction) {
            (OrderField::StartTime, Direction::Descending) => {
                keyed.sort_by_key(|(start, _)| (start.is_none(), Reverse(*start)))
            }
            (OrderField::StartTime, Direction::Ascending) => {
                keyed.sort_by_key(|(start, _)| (start.is_none(), *start))
            }
        }

        Ok(keyed
            .into_iter()
            .take(query.limit)
            .map(|(_, session)| session)
            .collect())
    }

    fn describe(&self) -> String {
        format!("file: {}", self.path.display())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
