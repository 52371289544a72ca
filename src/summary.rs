//! Per-session summary statistics

use serde::Serialize;

use crate::classify::StateCategory;
use crate::model::ReadingRecord;

/// Reading counts by glycemic category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub severe_hypoglycemia: usize,
    pub mild_hypoglycemia: usize,
    pub hyperglycemia: usize,
    pub normal: usize,
    pub uncategorized: usize,
}

impl StateCounts {
    fn add(&mut self, category: StateCategory) {
        match category {
            StateCategory::SevereHypoglycemia => self.severe_hypoglycemia += 1,
            StateCategory::MildHypoglycemia => self.mild_hypoglycemia += 1,
            StateCategory::Hyperglycemia => self.hyperglycemia += 1,
            StateCategory::Normal => self.normal += 1,
            StateCategory::Uncategorized => self.uncategorized += 1,
        }
    }

    pub fn get(&self, category: StateCategory) -> usize {
        match category {
            StateCategory::SevereHypoglycemia => self.severe_hypoglycemia,
            StateCategory::MildHypoglycemia => self.mild_hypoglycemia,
            StateCategory::Hyperglycemia => self.hyperglycemia,
            StateCategory::Normal => self.normal,
            StateCategory::Uncategorized => self.uncategorized,
        }
    }
}

/// Glucose range of a session (mg/dL)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlucoseSpan {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub readings: usize,
    pub states: StateCounts,
    pub protocol_activations: usize,
    pub glucose: Option<GlucoseSpan>,
}

impl SessionSummary {
    pub fn from_readings(readings: &[ReadingRecord]) -> Self {
        let mut summary = Self {
            readings: readings.len(),
            ..Self::default()
        };

        for reading in readings {
            summary.states.add(StateCategory::from_label(reading.state.as_deref()));
            if reading.protocol_activated {
                summary.protocol_activations += 1;
            }
        }

        let values: Vec<f64> = readings.iter().filter_map(|r| r.glucose).collect();
        if !values.is_empty() {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            summary.glucose = Some(GlucoseSpan { min, max, mean });
        }

        summary
    }

    /// One-line description, e.g. `3 readings, 1 severe hypo, 1 protocol activation, 52-180 mg/dL (avg 100)`
    pub fn describe(&self) -> String {
        if self.readings == 0 {
            return "0 readings".to_string();
        }

        let mut parts = vec![plural(self.readings, "reading")];
        let flagged = [
            (self.states.severe_hypoglycemia, "severe hypo"),
            (self.states.mild_hypoglycemia, "mild hypo"),
            (self.states.hyperglycemia, "hyper"),
        ];
        for (count, name) in flagged {
            if count > 0 {
                parts.push(format!("{} {}", count, name));
            }
        }
        if self.protocol_activations > 0 {
            parts.push(plural(self.protocol_activations, "protocol activation"));
        }
        if let Some(span) = &self.glucose {
            parts.push(format!("{}-{} mg/dL (avg {:.0})", span.min, span.max, span.mean));
        }
        parts.join(", ")
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", count, noun)
    }
}
