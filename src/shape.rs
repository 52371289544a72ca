//! Shapes session records into plain display records
//!
//! Nothing here knows about terminals or HTML; display surfaces take the
//! views produced below and only decide how to draw them.

use serde::Serialize;

use crate::classify::StateCategory;
use crate::model::{ReadingRecord, SessionRecord};
use crate::summary::SessionSummary;
use crate::timestamp::{TimestampNormalizer, NOT_AVAILABLE};

/// Column headers of a reading table
pub const READING_COLUMNS: [&str; 5] = ["Time", "Glucose (mg/dL)", "Prediction", "State", "Protocol"];

/// Shown in place of an absent prediction
pub const NO_PREDICTION: &str = "-";

pub const NO_READINGS_MESSAGE: &str = "No readings available for this session";

/// One reading as displayed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRow {
    pub time: String,
    pub glucose: String,
    pub prediction: String,
    /// Raw state label, empty when absent
    pub state: String,
    pub category: StateCategory,
    pub protocol: String,
}

/// Table body of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionBody {
    Rows { rows: Vec<ReadingRow> },
    /// A single placeholder row spanning `colspan` columns
    Empty { message: String, colspan: usize },
}

impl SessionBody {
    pub fn rows(&self) -> &[ReadingRow] {
        match self {
            SessionBody::Rows { rows } => rows,
            SessionBody::Empty { .. } => &[],
        }
    }
}

/// One session as displayed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub id: String,
    pub device_type: String,
    pub date: String,
    pub time: String,
    pub body: SessionBody,
    pub summary: SessionSummary,
}

/// Turns records into views using a configured timestamp normalizer
#[derive(Debug, Clone, Default)]
pub struct SessionShaper {
    normalizer: TimestampNormalizer,
}

impl SessionShaper {
    pub fn new(normalizer: TimestampNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn shape_session(&self, session: &SessionRecord) -> SessionView {
        let (date, time) = self.normalizer.format_session_start(&session.start_time);

        let body = if session.readings.is_empty() {
            SessionBody::Empty {
                message: NO_READINGS_MESSAGE.to_string(),
                colspan: READING_COLUMNS.len(),
            }
        } else {
            SessionBody::Rows {
                rows: session
                    .readings
                    .iter()
                    .map(|reading| self.shape_reading(reading))
                    .collect(),
            }
        };

        SessionView {
            id: session.id.clone(),
            device_type: session.device_type.clone(),
            date,
            time,
            body,
            summary: SessionSummary::from_readings(&session.readings),
        }
    }

    pub fn shape_reading(&self, reading: &ReadingRecord) -> ReadingRow {
        let state = reading.state.as_deref();
        ReadingRow {
            time: self.normalizer.format_reading_time(&reading.time),
            glucose: reading
                .glucose
                .map(format_value)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            // 0 is a real prediction; only absence gets the dash
            prediction: reading
                .prediction
                .map(format_value)
                .unwrap_or_else(|| NO_PREDICTION.to_string()),
            state: state.unwrap_or_default().to_string(),
            category: StateCategory::from_label(state),
            protocol: yes_no(reading.protocol_activated).to_string(),
        }
    }
}

/// Numbers are shown as stored: `180` stays `180`, `95.5` stays `95.5`
fn format_value(value: f64) -> String {
    format!("{}", value)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}
