//! Derived score attachments
//!
//! Scores are recomputed on demand. A persisted copy is a display cache and
//! is dropped whenever cluster membership changes.

use serde::{Deserialize, Serialize};

/// Discrete emergence classification derived from the growth ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergenceLevel {
    Rapid,
    Stable,
    Dormant,
}

impl EmergenceLevel {
    /// Feed ordering priority (higher sorts first)
    pub fn priority(self) -> u8 {
        match self {
            EmergenceLevel::Rapid => 3,
            EmergenceLevel::Stable => 2,
            EmergenceLevel::Dormant => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmergenceLevel::Rapid => "rapid",
            EmergenceLevel::Stable => "stable",
            EmergenceLevel::Dormant => "dormant",
        }
    }
}

impl std::fmt::Display for EmergenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores attached to a cluster for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAttachment {
    pub emergence_level: EmergenceLevel,
    /// Share of member signals inside the recent window, in [0,1]
    pub growth_ratio: f64,
    /// Mean member-to-centroid similarity, in [0,1]
    #[serde(default)]
    pub coherence: f64,
    /// `growth_ratio` as a percentage, in [0,100]
    #[serde(default)]
    pub recency_pct: f64,
    /// Number of distinct sources
    #[serde(default)]
    pub source_diversity: usize,
}

impl ScoreAttachment {
    /// Attachment carrying only the emergence part; grounding fields are zero
    /// until grounding runs.
    pub fn from_growth(emergence_level: EmergenceLevel, growth_ratio: f64) -> Self {
        Self {
            emergence_level,
            growth_ratio,
            coherence: 0.0,
            recency_pct: 0.0,
            source_diversity: 0,
        }
    }
}
