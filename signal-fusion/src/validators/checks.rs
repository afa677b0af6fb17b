// Local Card Checks
// Deterministic consistency checks run before the external review

use crate::config::ValidationConfig;
use common::{
    Candidate, Issue, IssueCategory, MarketContext, Recommendation, Severity, SignalSource, Strictness,
    TradeDirection, Urgency,
};

/// Catalyst words that make a card time-sensitive
const TIME_SENSITIVE_KEYWORDS: &[&str] = &[
    "earnings",
    "fda",
    "guidance",
    "approval",
    "merger",
    "acquisition",
    "announcement",
    "investor day",
    "conference call",
    "ruling",
    "split",
];

/// Earnings events this close count as imminent
const IMMINENT_EVENT_DAYS: f64 = 5.0;

/// Everything a check may look at
pub struct CheckContext<'a> {
    pub recommendation: &'a Recommendation,
    pub candidate: &'a Candidate,
    /// Latest market snapshot, which may be newer than the candidate's
    pub market: &'a MarketContext,
    pub strictness: Strictness,
    pub config: &'a ValidationConfig,
}

/// One deterministic check over a trade card
pub trait CardCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue>;
}

/// Penalty a single issue takes off the local score
pub fn severity_penalty(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 0.40,
        Severity::High => 0.20,
        Severity::Medium => 0.10,
        Severity::Low => 0.05,
    }
}

/// `1 - Σ penalties`, bounded to [0, 1]
pub fn local_score(issues: &[Issue]) -> f64 {
    let penalty: f64 = issues.iter().map(|issue| severity_penalty(issue.severity)).sum();
    (1.0 - penalty).clamp(0.0, 1.0)
}

/// The standard check set, in the order issues are reported
pub fn default_checks() -> Vec<Box<dyn CardCheck>> {
    vec![
        Box::new(PriceOrderingCheck),
        Box::new(RiskRewardCheck),
        Box::new(PositionSizingCheck),
        Box::new(TimingCheck),
        Box::new(CatalystRelevanceCheck),
        Box::new(PriceDriftCheck),
        Box::new(ConfidenceCalibrationCheck),
    ]
}

/// Stop and target must sit on the sides the direction implies
pub struct PriceOrderingCheck;

impl CardCheck for PriceOrderingCheck {
    fn name(&self) -> &'static str {
        "price_ordering"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue> {
        let plan = &ctx.recommendation.execution;
        let direction = ctx.recommendation.header.direction;
        let (stop_ok, target_ok, side) = match direction {
            TradeDirection::Long => (plan.stop_loss < plan.entry_price, plan.target_price > plan.entry_price, "long"),
            TradeDirection::Short => (plan.stop_loss > plan.entry_price, plan.target_price < plan.entry_price, "short"),
        };

        let mut issues = Vec::new();
        if !stop_ok {
            issues.push(Issue::new(
                IssueCategory::LogicError,
                Severity::Critical,
                format!("stop loss is on the wrong side of entry for a {} trade", side),
                format!("entry {:.4}, stop {:.4}", plan.entry_price, plan.stop_loss),
                match direction {
                    TradeDirection::Long => "place the stop below entry",
                    TradeDirection::Short => "place the stop above entry",
                },
            ));
        }
        if !target_ok {
            issues.push(Issue::new(
                IssueCategory::LogicError,
                Severity::Critical,
                format!("target is on the wrong side of entry for a {} trade", side),
                format!("entry {:.4}, target {:.4}", plan.entry_price, plan.target_price),
                match direction {
                    TradeDirection::Long => "place the target above entry",
                    TradeDirection::Short => "place the target below entry",
                },
            ));
        }
        issues
    }
}

/// Stated ratio must match the prices and clear the trade type minimum
pub struct RiskRewardCheck;

impl CardCheck for RiskRewardCheck {
    fn name(&self) -> &'static str {
        "risk_reward"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue> {
        let plan = &ctx.recommendation.execution;
        let Some(recomputed) = plan.implied_risk_reward() else {
            return Vec::new();
        };

        let mut issues = Vec::new();
        let stated = plan.risk_reward_ratio;
        let mismatch = if recomputed > 0.0 {
            (stated - recomputed).abs() / recomputed
        } else {
            stated.abs()
        };
        if !stated.is_finite() || mismatch > ctx.config.risk_reward_tolerance {
            issues.push(Issue::new(
                IssueCategory::LogicError,
                Severity::Medium,
                "stated risk/reward does not match the prices",
                format!("stated {:.2}, recomputed {:.2}", stated, recomputed),
                "restate the ratio from entry, target and stop",
            ));
        }

        let trade_type = ctx.recommendation.header.trade_type;
        let minimum = trade_type.min_risk_reward() * minimum_scale(ctx.strictness);
        if recomputed < minimum {
            let severity = match ctx.strictness {
                Strictness::Strict => Severity::Critical,
                _ => Severity::High,
            };
            issues.push(Issue::new(
                IssueCategory::RiskReward,
                severity,
                format!("risk/reward below the minimum for a {:?} trade", trade_type),
                format!("recomputed {:.2}, minimum {:.2}", recomputed, minimum),
                "widen the target or tighten the stop",
            ));
        }
        issues
    }
}

/// Position size must sit inside the risk grade's range
pub struct PositionSizingCheck;

impl CardCheck for PositionSizingCheck {
    fn name(&self) -> &'static str {
        "position_sizing"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue> {
        let size = ctx.recommendation.execution.position_size;
        let grade = ctx.recommendation.header.risk_grade;
        let (min, max) = grade.position_size_range();
        let evidence = format!("size {:.4}, {:?} range {:.4}-{:.4}", size, grade, min, max);

        if !size.is_finite() || size > max {
            vec![Issue::new(
                IssueCategory::PositionSizing,
                Severity::High,
                "position size exceeds the range for its risk grade",
                evidence,
                format!("reduce the position to at most {:.4}", max),
            )]
        } else if size < min {
            vec![Issue::new(
                IssueCategory::PositionSizing,
                Severity::Low,
                "position size is below the range for its risk grade",
                evidence,
                format!("size at least {:.4} or drop the trade", min),
            )]
        } else {
            Vec::new()
        }
    }
}

/// Entry urgency must fit how time-sensitive the catalyst is
pub struct TimingCheck;

impl TimingCheck {
    fn is_time_sensitive(ctx: &CheckContext<'_>) -> bool {
        let catalyst = ctx.recommendation.narrative.catalyst.to_ascii_lowercase();
        if TIME_SENSITIVE_KEYWORDS.iter().any(|keyword| catalyst.contains(keyword)) {
            return true;
        }
        ctx.candidate
            .signal(SignalSource::EarningsTiming)
            .and_then(|signal| signal.subscore("days_to_event"))
            .map(|days| days >= 0.0 && days <= IMMINENT_EVENT_DAYS)
            .unwrap_or(false)
    }
}

impl CardCheck for TimingCheck {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue> {
        let urgency = ctx.recommendation.narrative.timing.urgency;
        let sensitive = Self::is_time_sensitive(ctx);

        if sensitive && urgency == Urgency::Patient {
            vec![Issue::new(
                IssueCategory::Timing,
                Severity::Medium,
                "time-sensitive catalyst paired with a patient entry",
                format!("catalyst: {}", ctx.recommendation.narrative.catalyst),
                "tighten the entry window ahead of the event",
            )]
        } else if !sensitive && urgency == Urgency::Immediate {
            vec![Issue::new(
                IssueCategory::Timing,
                Severity::Low,
                "immediate entry without a time-sensitive catalyst",
                format!("catalyst: {}", ctx.recommendation.narrative.catalyst),
                "wait for confirmation instead of chasing",
            )]
        } else {
            Vec::new()
        }
    }
}

/// Catalyst should speak to the setup it is supposed to drive
pub struct CatalystRelevanceCheck;

impl CardCheck for CatalystRelevanceCheck {
    fn name(&self) -> &'static str {
        "catalyst_relevance"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue> {
        let narrative = &ctx.recommendation.narrative;
        let catalyst = narrative.catalyst.to_ascii_lowercase();
        if narrative.setup_type.keywords().iter().any(|keyword| catalyst.contains(keyword)) {
            return Vec::new();
        }
        let severity = match ctx.strictness {
            Strictness::Strict => Severity::High,
            _ => Severity::Medium,
        };
        vec![Issue::new(
            IssueCategory::CatalystRelevance,
            severity,
            format!("catalyst does not support a {:?} setup", narrative.setup_type),
            format!("catalyst: {}", narrative.catalyst),
            "name a catalyst that drives this setup or change the setup type",
        )]
    }
}

/// Entry must still be near the market
pub struct PriceDriftCheck;

impl CardCheck for PriceDriftCheck {
    fn name(&self) -> &'static str {
        "price_drift"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue> {
        let market = ctx.market.current_price;
        if !market.is_finite() || market <= 0.0 {
            return Vec::new();
        }
        let entry = ctx.recommendation.execution.entry_price;
        let drift = (entry - market).abs() / market;
        let tolerance = ctx.config.max_entry_drift_pct * drift_scale(ctx.strictness);
        if drift <= tolerance {
            return Vec::new();
        }
        vec![Issue::new(
            IssueCategory::PriceDrift,
            Severity::Medium,
            "entry has drifted away from the market price",
            format!("entry {:.4}, market {:.4}, drift {:.1}%", entry, market, drift * 100.0),
            "reprice the entry against the current market",
        )]
    }
}

/// Self-reported confidence must not run far ahead of the signals
pub struct ConfidenceCalibrationCheck;

impl CardCheck for ConfidenceCalibrationCheck {
    fn name(&self) -> &'static str {
        "confidence_calibration"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Vec<Issue> {
        let confidence = ctx.recommendation.header.confidence;
        let composite = ctx.recommendation.signal_composition.composite;
        if confidence - composite <= ctx.config.max_confidence_gap {
            return Vec::new();
        }
        vec![Issue::new(
            IssueCategory::ConfidenceCalibration,
            Severity::Medium,
            "confidence is well above what the signals support",
            format!("confidence {:.2}, composite {:.2}", confidence, composite),
            "lower the confidence toward the composite score",
        )]
    }
}

fn minimum_scale(strictness: Strictness) -> f64 {
    match strictness {
        Strictness::Lenient => 0.8,
        Strictness::Standard => 1.0,
        Strictness::Strict => 1.2,
    }
}

fn drift_scale(strictness: Strictness) -> f64 {
    match strictness {
        Strictness::Lenient => 1.5,
        Strictness::Standard => 1.0,
        Strictness::Strict => 0.6,
    }
}
