//! Record payloads: judgments, entities, and learned patterns.
//!
//! Field names serialize in camelCase so that resolve paths such as
//! `data/qScore` read the same as the records they came from.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NodeError, NodeResult};

/// Outcome class of a judgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Howl,
    Wag,
    Growl,
    Bark,
}

impl Verdict {
    pub const BARK_MAX: f64 = 38.2;
    pub const GROWL_MAX: f64 = 61.8;
    pub const WAG_MAX: f64 = 82.0;

    /// Map a Q-score (0..=100) to its verdict.
    pub fn from_q_score(q_score: f64) -> Self {
        if q_score < Self::BARK_MAX {
            Self::Bark
        } else if q_score < Self::GROWL_MAX {
            Self::Growl
        } else if q_score < Self::WAG_MAX {
            Self::Wag
        } else {
            Self::Howl
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Howl => write!(f, "HOWL"),
            Self::Wag => write!(f, "WAG"),
            Self::Growl => write!(f, "GROWL"),
            Self::Bark => write!(f, "BARK"),
        }
    }
}

/// A scored judgment, indexed by its external `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Judgment {
    pub id: String,
    pub q_score: f64,
    pub verdict: Verdict,
    pub confidence: f64,
    /// Per-dimension score breakdown.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
    /// The judged content, or a digest of it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Judgment {
    /// Create a judgment whose verdict is derived from the Q-score.
    pub fn new(id: impl Into<String>, q_score: f64, confidence: f64) -> Self {
        Self {
            id: id.into(),
            q_score,
            verdict: Verdict::from_q_score(q_score),
            confidence,
            dimensions: BTreeMap::new(),
            item_type: None,
            content: None,
            timestamp: None,
        }
    }

    /// Override the derived verdict.
    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = verdict;
        self
    }

    pub fn with_dimension(mut self, name: impl Into<String>, score: f64) -> Self {
        self.dimensions.insert(name.into(), score);
        self
    }

    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub(crate) fn check_finite(&self) -> NodeResult<()> {
        finite("qScore", self.q_score)?;
        finite("confidence", self.confidence)?;
        for (name, score) in &self.dimensions {
            finite(name, *score)?;
        }
        Ok(())
    }
}

/// A generic entity addressed by `(entity_type, identifier)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Entity {
    pub entity_type: String,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            identifier: identifier.into(),
            name: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A learned pattern, indexed by `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Pattern {
    pub id: String,
    pub pattern_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub confidence: f64,
    pub occurrences: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Pattern {
    pub fn new(id: impl Into<String>, pattern_type: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: id.into(),
            pattern_type: pattern_type.into(),
            description: None,
            confidence,
            occurrences: 1,
            data: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_occurrences(mut self, occurrences: u64) -> Self {
        self.occurrences = occurrences;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub(crate) fn check_finite(&self) -> NodeResult<()> {
        finite("confidence", self.confidence)
    }
}

fn finite(field: &str, value: f64) -> NodeResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NodeError::NonCanonical(format!(
            "field {field} is not a finite number: {value}"
        )))
    }
}
