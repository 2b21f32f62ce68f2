//! Named token-pressure bands derived from `current_tokens / context_limit`.

use serde::{Deserialize, Serialize};

/// Band boundaries as fractions of the context limit.
pub mod bands {
    /// Lower edge of [`super::ThresholdLevel::Warning`].
    pub const WARNING: f64 = 0.50;
    /// Lower edge of [`super::ThresholdLevel::Alert`].
    pub const ALERT: f64 = 0.70;
    /// Lower edge of [`super::ThresholdLevel::Critical`].
    pub const CRITICAL: f64 = 0.85;
    /// Lower edge of [`super::ThresholdLevel::Exceeded`].
    pub const EXCEEDED: f64 = 0.95;
}

/// Named band for the current token pressure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdLevel {
    /// Below half the limit.
    Normal,
    /// At least half the limit.
    Warning,
    /// Compaction is recommended.
    Alert,
    /// Compaction is overdue.
    Critical,
    /// The next turn is likely to fail without compaction.
    Exceeded,
}

impl ThresholdLevel {
    /// Classify a usage ratio into its band.
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= bands::EXCEEDED {
            Self::Exceeded
        } else if ratio >= bands::CRITICAL {
            Self::Critical
        } else if ratio >= bands::ALERT {
            Self::Alert
        } else if ratio >= bands::WARNING {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}
