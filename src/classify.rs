//! Glycemic state classification
//!
//! Maps the recorder's state labels to presentation categories. Matching is
//! exact and case-sensitive; anything else is left uncategorized.

use serde::{Deserialize, Serialize};

/// Presentation category of a reading's glycemic state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateCategory {
    Hyperglycemia,
    MildHypoglycemia,
    SevereHypoglycemia,
    Normal,
    #[default]
    Uncategorized,
}

impl StateCategory {
    /// Classify a raw state label
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("Hyperglycemia") => StateCategory::Hyperglycemia,
            Some("Mild Hypoglycemia") => StateCategory::MildHypoglycemia,
            Some("Severe Hypoglycemia") => StateCategory::SevereHypoglycemia,
            Some("Normal") => StateCategory::Normal,
            _ => StateCategory::Uncategorized,
        }
    }

    /// Style class for display surfaces; `None` means no special styling
    pub fn class_name(self) -> Option<&'static str> {
        match self {
            StateCategory::Hyperglycemia => Some("hyperglycemia"),
            StateCategory::MildHypoglycemia => Some("mild-hypoglycemia"),
            StateCategory::SevereHypoglycemia => Some("severe-hypoglycemia"),
            StateCategory::Normal => Some("normal"),
            StateCategory::Uncategorized => None,
        }
    }
}
