//! Trade card types
//!
//! A `Recommendation` is created once, by synthesis or by the fallback
//! generator, and is never mutated afterwards. Validation wraps it in a
//! `ValidationVerdict` instead of editing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::signal::SignalSource;

/// `metadata.model_used` value carried by degraded, rule-based cards
pub const FALLBACK_MODEL: &str = "fallback";

/// How the composer treats a source that did not report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSourcePolicy {
    /// Missing source contributes zero; its weight is not redistributed
    #[default]
    ZeroFill,
    /// Composite is divided by the total weight of the sources that reported
    Renormalize,
}

/// Weighted fusion of a candidate's signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub contributions: BTreeMap<SignalSource, f64>,
    pub composite: f64, // 0.0 to 1.0
    pub policy: MissingSourcePolicy,
    #[serde(default)]
    pub missing: Vec<SignalSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Scalp,
    DayTrade,
    Swing,
    Position,
}

impl TradeType {
    /// Minimum reward-to-risk a card of this type must offer
    pub fn min_risk_reward(&self) -> f64 {
        match self {
            TradeType::Scalp => 1.5,
            TradeType::DayTrade => 1.5,
            TradeType::Swing => 2.0,
            TradeType::Position => 2.5,
        }
    }

    pub fn default_timeframe(&self) -> &'static str {
        match self {
            TradeType::Scalp => "intraday",
            TradeType::DayTrade => "1 day",
            TradeType::Swing => "3-10 days",
            TradeType::Position => "2-8 weeks",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskGrade {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskGrade {
    /// Allowed position size, as a fraction of capital, for this grade
    pub fn position_size_range(&self) -> (f64, f64) {
        match self {
            RiskGrade::Low => (0.02, 0.10),
            RiskGrade::Medium => (0.01, 0.06),
            RiskGrade::High => (0.005, 0.03),
            RiskGrade::VeryHigh => (0.0025, 0.01),
        }
    }

    /// Grade from a risk signal score, where the score is already inverted
    /// (1.0 = least risky)
    pub fn from_inverted_score(score: f64) -> Self {
        match score {
            s if s >= 0.75 => RiskGrade::Low,
            s if s >= 0.5 => RiskGrade::Medium,
            s if s >= 0.25 => RiskGrade::High,
            _ => RiskGrade::VeryHigh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupType {
    Breakout,
    Pullback,
    Reversal,
    Momentum,
    SupportResistance,
    EarningsPlay,
}

impl SetupType {
    /// Words a catalyst relevant to this setup is expected to mention
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            SetupType::Breakout => &["breakout", "break out", "resistance", "volume", "range", "high", "consolidation"],
            SetupType::Pullback => &["pullback", "retrace", "dip", "support", "moving average", "trend", "bounce"],
            SetupType::Reversal => &["reversal", "oversold", "overbought", "divergence", "exhaustion", "capitulation", "bottom", "top"],
            SetupType::Momentum => &["momentum", "trend", "strength", "volume", "upgrade", "inflow", "relative strength"],
            SetupType::SupportResistance => &["support", "resistance", "level", "range", "bounce", "rejection"],
            SetupType::EarningsPlay => &["earnings", "guidance", "revenue", "eps", "report", "quarter", "results"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Immediate,
    Today,
    ThisWeek,
    Patient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCardHeader {
    pub confidence: f64, // 0.0 to 1.0
    pub trade_type: TradeType,
    pub timeframe: String,
    pub direction: TradeDirection,
    pub risk_grade: RiskGrade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingPlan {
    pub urgency: Urgency,
    pub entry_window: String,
}

impl Default for TimingPlan {
    fn default() -> Self {
        Self {
            urgency: Urgency::Patient,
            entry_window: "wait for confirmation at entry level".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeNarrative {
    pub setup: String,
    pub setup_type: SetupType,
    pub catalyst: String,
    pub timing: TimingPlan,
    pub confirmation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub position_size: f64, // fraction of capital
    pub risk_reward_ratio: f64,
}

impl ExecutionPlan {
    /// `|target - entry| / |entry - stop|`, or `None` when entry equals stop
    pub fn implied_risk_reward(&self) -> Option<f64> {
        implied_risk_reward(self.entry_price, self.target_price, self.stop_loss)
    }

    /// Whether prices are ordered the way `direction` requires
    pub fn ordering_matches(&self, direction: TradeDirection) -> bool {
        match direction {
            TradeDirection::Long => {
                self.target_price > self.entry_price && self.entry_price > self.stop_loss
            }
            TradeDirection::Short => {
                self.target_price < self.entry_price && self.entry_price < self.stop_loss
            }
        }
    }
}

pub fn implied_risk_reward(entry: f64, target: f64, stop: f64) -> Option<f64> {
    let risk = (entry - stop).abs();
    if risk <= f64::EPSILON || !risk.is_finite() {
        return None;
    }
    let ratio = (target - entry).abs() / risk;
    ratio.is_finite().then_some(ratio)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationMetadata {
    pub id: Uuid,
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
    /// Set when the ratio was under the trade type minimum at synthesis time
    #[serde(default)]
    pub risk_reward_below_minimum: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl RecommendationMetadata {
    pub fn new(model_used: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model_used: model_used.into(),
            generated_at: Utc::now(),
            risk_reward_below_minimum: false,
            notes: Vec::new(),
        }
    }
}

/// A trade card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub header: TradeCardHeader,
    pub narrative: TradeNarrative,
    pub execution: ExecutionPlan,
    pub signal_composition: CompositeScore,
    #[serde(default)]
    pub counter_signals: Vec<String>,
    pub metadata: RecommendationMetadata,
}

impl Recommendation {
    pub fn is_fallback(&self) -> bool {
        self.metadata.model_used == FALLBACK_MODEL
    }
}
