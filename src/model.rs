//! Session and reading records as delivered by a session store

use chrono::{DateTime, Utc};
use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::error::HistoryError;

/// A timestamp exactly as the store handed it over.
///
/// Documents written through different access paths encode instants
/// differently, so the raw value is kept and only resolved when formatted.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawTimestamp {
    /// Already converted to a date by the store client
    Native(DateTime<Utc>),
    /// Whatever JSON value the document carried
    Document(Value),
    #[default]
    Missing,
}

impl From<Option<Value>> for RawTimestamp {
    fn from(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => RawTimestamp::Missing,
            Some(v) => RawTimestamp::Document(v),
        }
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        RawTimestamp::Native(value)
    }
}

/// One monitoring session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub device_type: String,
    pub start_time: RawTimestamp,
    /// Chronological order as recorded upstream
    pub readings: Vec<ReadingRecord>,
}

/// One timestamped glucose measurement
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingRecord {
    pub time: RawTimestamp,
    /// mg/dL; `None` when the document carried no usable value
    pub glucose: Option<f64>,
    pub prediction: Option<f64>,
    /// Raw glycemic state label, unvalidated
    pub state: Option<String>,
    pub protocol_activated: bool,
}

#[derive(Debug, Deserialize)]
struct SessionFields {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "deviceType", alias = "device_type")]
    device_type: Option<String>,
    #[serde(default, rename = "startTime", alias = "start_time")]
    start_time: Option<Value>,
    #[serde(default)]
    readings: Option<Vec<ReadingFields>>,
}

#[derive(Debug, Deserialize)]
struct ReadingFields {
    #[serde(default)]
    time: Option<Value>,
    #[serde(default)]
    glucose: Option<Value>,
    #[serde(default)]
    prediction: Option<Value>,
    #[serde(default)]
    state: Option<Value>,
    #[serde(default, rename = "protocolActivated", alias = "protocol_activated")]
    protocol_activated: Option<bool>,
}

impl SessionRecord {
    /// Decode a session document.
    ///
    /// `key` is the document key in the store; an `id` member inside the
    /// document takes precedence over it.
    pub fn from_document(key: Option<&str>, document: &Value) -> Result<Self, HistoryError> {
        let doc = SessionFields::deserialize(document).map_err(|e| {
            HistoryError::InvalidDocument(format!("{}: {}", key.unwrap_or("<no id>"), e))
        })?;

        let id = doc
            .id
            .or_else(|| key.map(str::to_string))
            .ok_or_else(|| HistoryError::InvalidDocument("session has no id".to_string()))?;

        let readings = doc
            .readings
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, reading)| ReadingRecord::from_document(&id, index, reading))
            .collect();

        Ok(Self {
            id,
            device_type: doc.device_type.unwrap_or_default(),
            start_time: doc.start_time.into(),
            readings,
        })
    }
}

impl ReadingRecord {
    fn from_document(session_id: &str, index: usize, doc: ReadingFields) -> Self {
        let number = |field: &str, value: Option<Value>| match value {
            Some(Value::Number(n)) => n.as_f64(),
            None | Some(Value::Null) => None,
            Some(other) => {
                warn!(
                    "{}: reading {} has a non-numeric {} value {}",
                    session_id, index, field, other
                );
                None
            }
        };

        // Non-string labels carry no category
        let state = match doc.state {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        Self {
            time: doc.time.into(),
            glucose: number("glucose", doc.glucose),
            prediction: number("prediction", doc.prediction),
            state,
            protocol_activated: doc.protocol_activated.unwrap_or(false),
        }
    }
}
