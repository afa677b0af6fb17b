// Trade Card Validator
// Local checks plus an external consistency review, folded into one verdict

pub mod checks;
pub mod review;

pub use checks::{default_checks, local_score, CardCheck, CheckContext};
pub use review::{ConsistencyReview, GenerativeReviewer, Reviewer};

use crate::config::ValidationConfig;
use chrono::Utc;
use common::{
    clamp_unit, Candidate, Issue, IssueCategory, MarketContext, Recommendation, Severity, Strictness,
    ValidationVerdict, VerdictRecommendation,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score handed out when the review could not run
pub const CONSERVATIVE_SCORE: f64 = 0.5;

/// Below this score the reviewer cannot talk the verdict up to a pass
const FORCED_REVISION_SCORE: f64 = 0.5;

/// Validates trade cards
pub struct Validator {
    checks: Vec<Box<dyn CardCheck>>,
    reviewer: Arc<dyn Reviewer>,
    config: ValidationConfig,
}

impl Validator {
    /// Validator with the standard local checks
    pub fn new(reviewer: Arc<dyn Reviewer>, config: ValidationConfig) -> Self {
        Self {
            checks: default_checks(),
            reviewer,
            config,
        }
    }

    /// Validator with no local checks; add them with `add_check`
    pub fn empty(reviewer: Arc<dyn Reviewer>, config: ValidationConfig) -> Self {
        Self {
            checks: Vec::new(),
            reviewer,
            config,
        }
    }

    pub fn add_check(mut self, check: Box<dyn CardCheck>) -> Self {
        debug!("Adding card check: {}", check.name());
        self.checks.push(check);
        self
    }

    pub fn default_strictness(&self) -> Strictness {
        self.config.strictness
    }

    /// Run every local check
    pub fn local_issues(
        &self,
        recommendation: &Recommendation,
        candidate: &Candidate,
        market: &MarketContext,
        strictness: Strictness,
    ) -> Vec<Issue> {
        let ctx = CheckContext {
            recommendation,
            candidate,
            market,
            strictness,
            config: &self.config,
        };
        self.checks.iter().flat_map(|check| check.check(&ctx)).collect()
    }

    pub async fn validate(
        &self,
        recommendation: &Recommendation,
        candidate: &Candidate,
        market: &MarketContext,
        strictness: Strictness,
    ) -> ValidationVerdict {
        let local_issues = self.local_issues(recommendation, candidate, market, strictness);
        let local = local_score(&local_issues);

        let review = match self.reviewer.review(recommendation, candidate, strictness).await {
            Ok(review) => review,
            Err(e) => {
                warn!(symbol = %recommendation.symbol, "Review failed, issuing conservative verdict: {}", e);
                return conservative_verdict(strictness);
            }
        };

        let proposed = review.proposed;
        let (issues, score) = self.combine(local_issues, local, review, strictness);
        let decision = self.decide(score, &issues, proposed, strictness);

        info!(
            symbol = %recommendation.symbol,
            score,
            issues = issues.len(),
            "Validation verdict: {:?}",
            decision
        );

        ValidationVerdict {
            passed: decision.is_passing(),
            validation_score: score,
            recommendation: decision,
            issues,
            strictness,
            reviewed_at: Utc::now(),
        }
    }

    fn combine(
        &self,
        mut issues: Vec<Issue>,
        local: f64,
        review: ConsistencyReview,
        strictness: Strictness,
    ) -> (Vec<Issue>, f64) {
        let fabrication_severity = match strictness {
            Strictness::Strict => Severity::Critical,
            _ => Severity::High,
        };
        issues.extend(review.issues);
        issues.extend(review.fabricated_claims.into_iter().map(|claim| {
            Issue::new(
                IssueCategory::Fabrication,
                fabrication_severity,
                "claim not supported by the input signals",
                claim,
                "remove the claim or cite the signal that supports it",
            )
        }));

        let weight = self.config.local_weight;
        let score = clamp_unit(weight * local + (1.0 - weight) * review.coherence_score);
        (issues, score)
    }

    /// Decision from score and issues; the reviewer's proposal only tightens it
    pub fn decide(
        &self,
        score: f64,
        issues: &[Issue],
        proposed: Option<VerdictRecommendation>,
        strictness: Strictness,
    ) -> VerdictRecommendation {
        let (approve, reject) = self.thresholds(strictness);
        let critical = issues.iter().any(|issue| issue.severity == Severity::Critical);
        let high = issues.iter().any(|issue| issue.severity == Severity::High);

        let mut decision = if critical || score < reject {
            VerdictRecommendation::Reject
        } else if score >= approve {
            if high {
                VerdictRecommendation::ApproveWithCaution
            } else {
                VerdictRecommendation::Approve
            }
        } else {
            VerdictRecommendation::Revise
        };

        if let Some(proposed) = proposed {
            decision = decision.max(proposed);
        }
        if score < FORCED_REVISION_SCORE {
            decision = decision.max(VerdictRecommendation::Revise);
        }
        decision
    }

    /// (approve, reject) thresholds after the strictness shift
    pub fn thresholds(&self, strictness: Strictness) -> (f64, f64) {
        let (approve_shift, reject_shift) = match strictness {
            Strictness::Lenient => (-0.05, -0.10),
            Strictness::Standard => (0.0, 0.0),
            Strictness::Strict => (0.05, 0.10),
        };
        (
            clamp_unit(self.config.approve_threshold + approve_shift),
            clamp_unit(self.config.reject_threshold + reject_shift),
        )
    }
}

/// Verdict used when validation itself could not complete
pub fn conservative_verdict(strictness: Strictness) -> ValidationVerdict {
    ValidationVerdict {
        passed: false,
        validation_score: CONSERVATIVE_SCORE,
        recommendation: VerdictRecommendation::Revise,
        issues: vec![Issue::new(
            IssueCategory::LogicError,
            Severity::Critical,
            "validation system unavailable",
            "consistency review did not complete",
            "re-run validation before acting on this card",
        )],
        strictness,
        reviewed_at: Utc::now(),
    }
}

/// Whether a verdict is the stand-in produced by `conservative_verdict`
pub fn is_conservative(verdict: &ValidationVerdict) -> bool {
    !verdict.passed
        && verdict.recommendation == VerdictRecommendation::Revise
        && verdict.issues.len() == 1
        && verdict.issues[0].description == "validation system unavailable"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::{
        CompositeScore, ExecutionPlan, MissingSourcePolicy, RecommendationMetadata, ReviewError, RiskGrade,
        SetupType, TimingPlan, TradeCardHeader, TradeDirection, TradeNarrative, TradeType,
    };
    use std::collections::BTreeMap;

    struct StaticReviewer(Result<ConsistencyReview, String>);

    #[async_trait]
    impl Reviewer for StaticReviewer {
        async fn review(
            &self,
            _recommendation: &Recommendation,
            _candidate: &Candidate,
            _strictness: Strictness,
        ) -> Result<ConsistencyReview, ReviewError> {
            self.0.clone().map_err(ReviewError::Schema)
        }
    }

    fn clean_review(coherence: f64) -> ConsistencyReview {
        ConsistencyReview {
            coherence_score: coherence,
            issues: Vec::new(),
            fabricated_claims: Vec::new(),
            proposed: None,
        }
    }

    fn validator(review: Result<ConsistencyReview, String>) -> Validator {
        Validator::new(Arc::new(StaticReviewer(review)), ValidationConfig::default())
    }

    fn card(entry: f64, target: f64, stop: f64) -> Recommendation {
        Recommendation {
            symbol: "AAPL".to_string(),
            header: TradeCardHeader {
                confidence: 0.6,
                trade_type: TradeType::Swing,
                timeframe: "3-10 days".to_string(),
                direction: TradeDirection::Long,
                risk_grade: RiskGrade::Medium,
            },
            narrative: TradeNarrative {
                setup: "Pullback to rising 20-day average".to_string(),
                setup_type: SetupType::Pullback,
                catalyst: "Orderly dip into support on light volume".to_string(),
                timing: TimingPlan::default(),
                confirmation: "Hold of 180".to_string(),
            },
            execution: ExecutionPlan {
                entry_price: entry,
                target_price: target,
                stop_loss: stop,
                position_size: 0.02,
                risk_reward_ratio: common::recommendation::implied_risk_reward(entry, target, stop).unwrap_or(1.0),
            },
            signal_composition: CompositeScore {
                contributions: BTreeMap::new(),
                composite: 0.55,
                policy: MissingSourcePolicy::ZeroFill,
                missing: Vec::new(),
            },
            counter_signals: Vec::new(),
            metadata: RecommendationMetadata::new("test"),
        }
    }

    fn candidate() -> Candidate {
        Candidate::new("AAPL", MarketContext::new(182.0, Utc::now()))
    }

    #[tokio::test]
    async fn test_clean_card_is_approved() {
        let candidate = candidate();
        let verdict = validator(Ok(clean_review(0.9)))
            .validate(&card(182.0, 194.0, 176.0), &candidate, &candidate.context, Strictness::Standard)
            .await;

        assert!(verdict.issues.is_empty(), "{:?}", verdict.issues);
        assert!((verdict.validation_score - 0.96).abs() < 1e-9);
        assert_eq!(verdict.recommendation, VerdictRecommendation::Approve);
        assert!(verdict.passed);
    }

    #[tokio::test]
    async fn test_wrong_side_stop_is_rejected() {
        let candidate = candidate();
        let verdict = validator(Ok(clean_review(1.0)))
            .validate(&card(182.0, 194.0, 185.0), &candidate, &candidate.context, Strictness::Standard)
            .await;

        assert_eq!(verdict.recommendation, VerdictRecommendation::Reject);
        assert!(!verdict.passed);
        assert!(verdict
            .issues_in(IssueCategory::LogicError)
            .any(|issue| issue.severity == Severity::Critical));
    }

    #[tokio::test]
    async fn test_review_failure_is_conservative() {
        let candidate = candidate();
        let verdict = validator(Err("collaborator exploded".to_string()))
            .validate(&card(182.0, 194.0, 176.0), &candidate, &candidate.context, Strictness::Strict)
            .await;

        assert_eq!(verdict.recommendation, VerdictRecommendation::Revise);
        assert!(!verdict.passed);
        assert_eq!(verdict.validation_score, CONSERVATIVE_SCORE);
        assert_eq!(verdict.issues.len(), 1);
        assert_eq!(verdict.issues[0].category, IssueCategory::LogicError);
        assert_eq!(verdict.issues[0].severity, Severity::Critical);
        assert_eq!(verdict.strictness, Strictness::Strict);
        assert!(is_conservative(&verdict));
    }

    #[tokio::test]
    async fn test_fabricated_claims_become_issues() {
        let candidate = candidate();
        let mut review = clean_review(0.9);
        review.fabricated_claims = vec!["FDA approval expected".to_string()];

        let standard = validator(Ok(review.clone()))
            .validate(&card(182.0, 194.0, 176.0), &candidate, &candidate.context, Strictness::Standard)
            .await;
        assert_eq!(standard.recommendation, VerdictRecommendation::ApproveWithCaution);
        assert_eq!(standard.issues_in(IssueCategory::Fabrication).count(), 1);

        let strict = validator(Ok(review))
            .validate(&card(182.0, 194.0, 176.0), &candidate, &candidate.context, Strictness::Strict)
            .await;
        assert_eq!(strict.recommendation, VerdictRecommendation::Reject);
    }

    #[tokio::test]
    async fn test_proposal_only_tightens() {
        let candidate = candidate();
        let mut lenient_review = clean_review(0.9);
        lenient_review.proposed = Some(VerdictRecommendation::Approve);
        let wrong = validator(Ok(lenient_review))
            .validate(&card(182.0, 194.0, 185.0), &candidate, &candidate.context, Strictness::Standard)
            .await;
        assert_eq!(wrong.recommendation, VerdictRecommendation::Reject);

        let mut strict_review = clean_review(0.9);
        strict_review.proposed = Some(VerdictRecommendation::Revise);
        let tightened = validator(Ok(strict_review))
            .validate(&card(182.0, 194.0, 176.0), &candidate, &candidate.context, Strictness::Standard)
            .await;
        assert_eq!(tightened.recommendation, VerdictRecommendation::Revise);
        assert!(!tightened.passed);
    }

    #[test]
    fn test_decision_bands() {
        let v = validator(Ok(clean_review(1.0)));
        assert_eq!(v.decide(0.35, &[], None, Strictness::Standard), VerdictRecommendation::Reject);
        assert_eq!(v.decide(0.45, &[], None, Strictness::Standard), VerdictRecommendation::Revise);
        assert_eq!(v.decide(0.65, &[], None, Strictness::Standard), VerdictRecommendation::Revise);
        assert_eq!(v.decide(0.72, &[], None, Strictness::Standard), VerdictRecommendation::Approve);
        assert_eq!(v.decide(0.72, &[], None, Strictness::Strict), VerdictRecommendation::Revise);
        assert_eq!(v.decide(0.67, &[], None, Strictness::Lenient), VerdictRecommendation::Approve);
        assert_eq!(v.decide(0.45, &[], None, Strictness::Strict), VerdictRecommendation::Reject);

        let high = [Issue::new(IssueCategory::PositionSizing, Severity::High, "", "", "")];
        assert_eq!(
            v.decide(0.8, &high, None, Strictness::Standard),
            VerdictRecommendation::ApproveWithCaution
        );
    }

    #[test]
    fn test_low_score_forces_revision() {
        let mut config = ValidationConfig::default();
        config.approve_threshold = 0.45;
        config.reject_threshold = 0.2;
        let v = Validator::new(Arc::new(StaticReviewer(Ok(clean_review(1.0)))), config);
        assert_eq!(
            v.decide(0.47, &[], Some(VerdictRecommendation::Approve), Strictness::Standard),
            VerdictRecommendation::Revise
        );
    }

    #[tokio::test]
    async fn test_custom_check_set() {
        let candidate = candidate();
        let v = Validator::empty(Arc::new(StaticReviewer(Ok(clean_review(0.8)))), ValidationConfig::default())
            .add_check(Box::new(checks::PriceOrderingCheck));
        let issues = v.local_issues(&card(182.0, 170.0, 176.0), &candidate, &candidate.context, Strictness::Standard);
        assert_eq!(issues.len(), 1);
    }
}
