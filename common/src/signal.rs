//! Analytical signals produced by upstream analysis sources

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::clamp_unit;

/// Analysis category an upstream source reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Technical,
    Sentiment,
    Risk,
    Sector,
    Anomaly,
    EarningsTiming,
}

impl SignalSource {
    pub const ALL: [SignalSource; 6] = [
        SignalSource::Technical,
        SignalSource::Sentiment,
        SignalSource::Risk,
        SignalSource::Sector,
        SignalSource::Anomaly,
        SignalSource::EarningsTiming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Technical => "technical",
            SignalSource::Sentiment => "sentiment",
            SignalSource::Risk => "risk",
            SignalSource::Sector => "sector",
            SignalSource::Anomaly => "anomaly",
            SignalSource::EarningsTiming => "earnings_timing",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one analytical source for one symbol
///
/// Risk and sentiment producers hand over scores that are already oriented so
/// that higher is better for the trade (risk arrives as `1 - raw_risk`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticalSignal {
    pub source: SignalSource,
    pub score: f64, // 0.0 to 1.0
    #[serde(default)]
    pub subscores: BTreeMap<String, f64>,
    #[serde(default)]
    pub narrative: Vec<String>,
}

impl AnalyticalSignal {
    pub fn new(source: SignalSource, score: f64) -> Self {
        Self {
            source,
            score: clamp_unit(score),
            subscores: BTreeMap::new(),
            narrative: Vec::new(),
        }
    }

    pub fn with_subscore(mut self, name: impl Into<String>, value: f64) -> Self {
        self.subscores.insert(name.into(), value);
        self
    }

    pub fn with_narrative(mut self, fragment: impl Into<String>) -> Self {
        self.narrative.push(fragment.into());
        self
    }

    /// Score clamped into [0, 1], whatever the producer sent
    pub fn bounded_score(&self) -> f64 {
        clamp_unit(self.score)
    }

    pub fn subscore(&self, name: &str) -> Option<f64> {
        self.subscores.get(name).copied().filter(|v| v.is_finite())
    }
}
