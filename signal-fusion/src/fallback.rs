// Fallback Generator
// Rule-based trade cards for candidates whose synthesis failed

use crate::config::FallbackConfig;
use crate::synthesis::derive_risk_grade;
use common::recommendation::implied_risk_reward;
use common::{
    Candidate, CompositeScore, ExecutionPlan, Recommendation, RecommendationMetadata, SetupType,
    SignalSource, TimingPlan, TradeCardHeader, TradeDirection, TradeNarrative, TradeType, FALLBACK_MODEL,
};
use tracing::warn;

const MIN_CONFIDENCE: f64 = 0.2;
const MAX_CONFIDENCE: f64 = 0.3;
const MAX_OFFSET_PCT: f64 = 0.9;
const REFERENCE_PRICE: f64 = 1.0;

/// Deterministic substitute for a synthesized card
///
/// `generate` is total: whatever the candidate looks like, the card it returns
/// has positive prices ordered the way its direction requires.
#[derive(Debug, Clone)]
pub struct FallbackGenerator {
    confidence: f64,
    stop_offset_pct: f64,
    target_offset_pct: f64,
}

impl FallbackGenerator {
    pub fn new(config: &FallbackConfig) -> Self {
        let confidence = if config.confidence.is_finite() {
            config.confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
        } else {
            MIN_CONFIDENCE
        };
        Self {
            confidence,
            stop_offset_pct: sane_offset(config.stop_offset_pct, 0.03),
            target_offset_pct: sane_offset(config.target_offset_pct, 0.06),
        }
    }

    pub fn generate(&self, candidate: &Candidate, composite: &CompositeScore) -> Recommendation {
        let mut metadata = RecommendationMetadata::new(FALLBACK_MODEL);
        let ctx = &candidate.context;

        let price = if ctx.current_price.is_finite() && ctx.current_price > 0.0 {
            ctx.current_price
        } else {
            warn!(symbol = %candidate.symbol, price = ctx.current_price, "Unusable price, using reference price");
            metadata
                .notes
                .push(format!("current price {} unusable, reference price used", ctx.current_price));
            REFERENCE_PRICE
        };

        let technical = candidate.signal(SignalSource::Technical).map(|s| s.bounded_score());
        let direction = match technical {
            Some(score) if score < 0.5 => TradeDirection::Short,
            _ => TradeDirection::Long,
        };

        let below = ctx.nearest_level_below(price);
        let above = ctx.nearest_level_above(price);
        let (stop, target, used_levels) = match direction {
            TradeDirection::Long => (
                below.unwrap_or(price * (1.0 - self.stop_offset_pct)),
                above.unwrap_or(price * (1.0 + self.target_offset_pct)),
                below.is_some() || above.is_some(),
            ),
            TradeDirection::Short => (
                above.unwrap_or(price * (1.0 + self.stop_offset_pct)),
                below.unwrap_or(price * (1.0 - self.target_offset_pct)),
                below.is_some() || above.is_some(),
            ),
        };

        let risk_grade = derive_risk_grade(candidate);
        let trade_type = TradeType::Swing;
        let risk_reward_ratio = implied_risk_reward(price, target, stop).unwrap_or(0.0);
        metadata.risk_reward_below_minimum = risk_reward_ratio < trade_type.min_risk_reward();
        metadata.notes.push("generated without synthesis".to_string());

        let setup_type = if used_levels {
            SetupType::SupportResistance
        } else {
            SetupType::Momentum
        };
        let level_note = if used_levels { "nearest known levels" } else { "fixed offsets" };

        Recommendation {
            symbol: candidate.symbol.clone(),
            header: TradeCardHeader {
                confidence: self.confidence,
                trade_type,
                timeframe: trade_type.default_timeframe().to_string(),
                direction,
                risk_grade,
            },
            narrative: TradeNarrative {
                setup: format!(
                    "Rule-based {} setup at {:.4} with stop and target from {}",
                    direction_label(direction),
                    price,
                    level_note
                ),
                setup_type,
                catalyst: format!("Composite signal score {:.2}", composite.composite),
                timing: TimingPlan::default(),
                confirmation: "manual review required before entry".to_string(),
            },
            execution: ExecutionPlan {
                entry_price: price,
                target_price: target,
                stop_loss: stop,
                position_size: risk_grade.position_size_range().0,
                risk_reward_ratio,
            },
            signal_composition: composite.clone(),
            counter_signals: vec!["degraded output, synthesis unavailable".to_string()],
            metadata,
        }
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new(&FallbackConfig::default())
    }
}

fn sane_offset(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value.min(MAX_OFFSET_PCT)
    } else {
        default
    }
}

fn direction_label(direction: TradeDirection) -> &'static str {
    match direction {
        TradeDirection::Long => "long",
        TradeDirection::Short => "short",
    }
}
