//! Candidates awaiting fusion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::signal::{AnalyticalSignal, SignalSource};

/// Market snapshot taken when the candidate was built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub current_price: f64,
    #[serde(default)]
    pub support_levels: Vec<f64>,
    #[serde(default)]
    pub resistance_levels: Vec<f64>,
    #[serde(default)]
    pub atr: Option<f64>,
    #[serde(default)]
    pub sector: Option<String>,
    pub as_of: DateTime<Utc>,
}

impl MarketContext {
    pub fn new(current_price: f64, as_of: DateTime<Utc>) -> Self {
        Self {
            current_price,
            support_levels: Vec::new(),
            resistance_levels: Vec::new(),
            atr: None,
            sector: None,
            as_of,
        }
    }

    pub fn with_levels(mut self, support: Vec<f64>, resistance: Vec<f64>) -> Self {
        self.support_levels = support;
        self.resistance_levels = resistance;
        self
    }

    /// Highest known level strictly below `price`, from supports and resistances alike
    pub fn nearest_level_below(&self, price: f64) -> Option<f64> {
        self.support_levels
            .iter()
            .chain(self.resistance_levels.iter())
            .copied()
            .filter(|level| level.is_finite() && *level > 0.0 && *level < price)
            .fold(None, |best: Option<f64>, level| match best {
                Some(b) if b >= level => Some(b),
                _ => Some(level),
            })
    }

    /// Lowest known level strictly above `price`
    pub fn nearest_level_above(&self, price: f64) -> Option<f64> {
        self.resistance_levels
            .iter()
            .chain(self.support_levels.iter())
            .copied()
            .filter(|level| level.is_finite() && *level > price)
            .fold(None, |best: Option<f64>, level| match best {
                Some(b) if b <= level => Some(b),
                _ => Some(level),
            })
    }

    /// Hour bucket used to key cached composite scores
    pub fn hour_bucket(&self) -> String {
        self.as_of.format("%Y%m%d%H").to_string()
    }
}

/// An asset plus its market snapshot and whatever signals arrived for it
///
/// Any source may be absent; absence is never an error at this level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub context: MarketContext,
    #[serde(default)]
    pub signals: BTreeMap<SignalSource, AnalyticalSignal>,
}

impl Candidate {
    pub fn new(symbol: impl Into<String>, context: MarketContext) -> Self {
        Self {
            symbol: symbol.into(),
            context,
            signals: BTreeMap::new(),
        }
    }

    /// Attach a signal under its own source slot
    pub fn with_signal(mut self, signal: AnalyticalSignal) -> Self {
        self.signals.insert(signal.source, signal);
        self
    }

    pub fn signal(&self, source: SignalSource) -> Option<&AnalyticalSignal> {
        self.signals.get(&source)
    }

    pub fn missing_sources(&self) -> Vec<SignalSource> {
        SignalSource::ALL
            .iter()
            .copied()
            .filter(|source| !self.signals.contains_key(source))
            .collect()
    }
}
