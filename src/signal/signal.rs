//! Signal: one ingested text item

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique, run-stable identifier for a signal
///
/// Serializes as a plain string (usually a feed item GUID or URL hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(String);

impl SignalId {
    /// Create a SignalId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SignalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SignalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SignalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One ingested text item
///
/// Immutable once created; clusters reference signals by value but never
/// hold the same `signal_id` twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: SignalId,
    pub text: String,
    #[serde(with = "super::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "unknown_source")]
    pub source: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub subdomain: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn unknown_source() -> String {
    "unknown".to_string()
}

impl Signal {
    /// Create a signal with empty domain tags and metadata
    pub fn new(
        signal_id: impl Into<SignalId>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            text: text.into(),
            timestamp,
            source: source.into(),
            domain: String::new(),
            subdomain: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// Set the domain/subdomain tags
    pub fn with_domain(mut self, domain: impl Into<String>, subdomain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self.subdomain = subdomain.into();
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A signal paired with its embedding vector
///
/// Produced once at ingestion time. The vector travels with the signal
/// everywhere it is stored so nothing is embedded twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedSignal {
    #[serde(flatten)]
    pub signal: Signal,
    pub embedding: Vec<f32>,
}

impl EmbeddedSignal {
    pub fn new(signal: Signal, embedding: Vec<f32>) -> Self {
        Self { signal, embedding }
    }

    pub fn id(&self) -> &SignalId {
        &self.signal.signal_id
    }
}
