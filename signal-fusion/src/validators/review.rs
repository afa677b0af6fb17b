// Consistency Review
// External coherence review of a trade card by a generative collaborator

use crate::payload::{lenient_f64, lenient_string, lenient_strings, lenient_values, truncate_chars};
use crate::synthesis::CompletionClient;
use async_trait::async_trait;
use common::{
    clamp_unit, Candidate, Issue, IssueCategory, Recommendation, ReviewError, Severity, Strictness,
    VerdictRecommendation,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What the reviewer reported, already sanitized
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReview {
    pub coherence_score: f64,
    pub issues: Vec<Issue>,
    pub fabricated_claims: Vec<String>,
    pub proposed: Option<VerdictRecommendation>,
}

/// Independent reviewer of a synthesized card
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        recommendation: &Recommendation,
        candidate: &Candidate,
        strictness: Strictness,
    ) -> Result<ConsistencyReview, ReviewError>;
}

/// Reviewer backed by a `CompletionClient`
pub struct GenerativeReviewer {
    client: Arc<dyn CompletionClient>,
    timeout_ms: u64,
    max_issues: usize,
}

impl GenerativeReviewer {
    pub fn new(client: Arc<dyn CompletionClient>, timeout_ms: u64, max_issues: usize) -> Self {
        Self {
            client,
            timeout_ms,
            max_issues,
        }
    }

    fn build_prompt(
        &self,
        recommendation: &Recommendation,
        candidate: &Candidate,
        strictness: Strictness,
    ) -> Result<String, ReviewError> {
        let card = serde_json::to_string_pretty(recommendation).map_err(|e| ReviewError::Schema(e.to_string()))?;
        let evidence: Vec<String> = candidate
            .signals
            .values()
            .flat_map(|signal| {
                signal
                    .narrative
                    .iter()
                    .take(3)
                    .map(move |fragment| format!("[{}] {}", signal.source, truncate_chars(fragment, 240)))
            })
            .collect();

        Ok(format!(
            "Review this trade card for internal consistency at {} strictness.\n\
             Flag claims in the card that the evidence does not support as fabricated_claims.\n\
             Evidence:\n{}\n\nTrade card:\n{}\n",
            strictness,
            if evidence.is_empty() { "(none)".to_string() } else { evidence.join("\n") },
            card
        ))
    }

    pub fn output_schema() -> Value {
        json!({
            "type": "object",
            "required": ["coherence_score", "issues"],
            "properties": {
                "coherence_score": {"type": "number", "minimum": 0, "maximum": 1},
                "issues": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "category": {"type": "string"},
                            "severity": {"enum": ["low", "medium", "high", "critical"]},
                            "description": {"type": "string"},
                            "evidence": {"type": "string"},
                            "suggestion": {"type": "string"}
                        }
                    }
                },
                "fabricated_claims": {"type": "array", "items": {"type": "string"}},
                "recommendation": {"enum": ["approve", "approve_with_caution", "revise", "reject"]}
            }
        })
    }

    /// Sanitize a raw review payload
    pub fn parse_review(&self, payload: Value) -> Result<ConsistencyReview, ReviewError> {
        let raw: RawReview = serde_json::from_value(payload).map_err(|e| ReviewError::Schema(e.to_string()))?;
        let coherence_score = raw
            .coherence_score
            .map(clamp_unit)
            .ok_or_else(|| ReviewError::Schema("missing coherence_score".to_string()))?;

        let issues = raw
            .issues
            .into_iter()
            .filter_map(RawIssue::into_issue)
            .take(self.max_issues)
            .collect();

        Ok(ConsistencyReview {
            coherence_score,
            issues,
            fabricated_claims: raw.fabricated_claims.into_iter().take(self.max_issues).collect(),
            proposed: raw.recommendation.as_deref().and_then(VerdictRecommendation::parse),
        })
    }
}

#[async_trait]
impl Reviewer for GenerativeReviewer {
    async fn review(
        &self,
        recommendation: &Recommendation,
        candidate: &Candidate,
        strictness: Strictness,
    ) -> Result<ConsistencyReview, ReviewError> {
        let prompt = self.build_prompt(recommendation, candidate, strictness)?;
        let schema = Self::output_schema();
        debug!(symbol = %recommendation.symbol, "Requesting consistency review");

        let payload = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            self.client.complete(&prompt, &schema),
        )
        .await
        .map_err(|_| ReviewError::Timeout(self.timeout_ms))??;

        self.parse_review(payload)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReview {
    #[serde(deserialize_with = "lenient_f64")]
    coherence_score: Option<f64>,
    #[serde(deserialize_with = "lenient_values")]
    issues: Vec<Value>,
    #[serde(deserialize_with = "lenient_strings")]
    fabricated_claims: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    recommendation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawIssue {
    #[serde(deserialize_with = "lenient_string")]
    category: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    severity: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    evidence: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    suggestion: Option<String>,
}

impl RawIssue {
    /// Issues without a description carry nothing actionable and are dropped
    fn into_issue(value: Value) -> Option<Issue> {
        let raw: RawIssue = serde_json::from_value(value).ok()?;
        let description = raw.description?;
        Some(Issue::new(
            raw.category.as_deref().map(IssueCategory::parse).unwrap_or(IssueCategory::Coherence),
            raw.severity.as_deref().and_then(Severity::parse).unwrap_or(Severity::Medium),
            description,
            raw.evidence.unwrap_or_default(),
            raw.suggestion.unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CollaboratorError;

    struct FixedClient(Value);

    #[async_trait]
    impl CompletionClient for FixedClient {
        async fn complete(&self, _prompt: &str, _schema: &Value) -> Result<Value, CollaboratorError> {
            Ok(self.0.clone())
        }
    }

    fn reviewer(max_issues: usize) -> GenerativeReviewer {
        GenerativeReviewer::new(Arc::new(FixedClient(Value::Null)), 1_000, max_issues)
    }

    #[test]
    fn test_parse_sanitizes_review() {
        let review = reviewer(20)
            .parse_review(json!({
                "coherence_score": 1.7,
                "issues": [
                    {"category": "made up", "severity": "major", "description": "narrative contradicts direction"},
                    {"category": "timing", "severity": "whatever", "description": "entry window vague"},
                    {"severity": "low"},
                    "not an object"
                ],
                "fabricated_claims": ["analyst upgrade from nowhere"],
                "recommendation": "Approve With Caution"
            }))
            .unwrap();

        assert_eq!(review.coherence_score, 1.0);
        assert_eq!(review.issues.len(), 2);
        assert_eq!(review.issues[0].category, IssueCategory::Coherence);
        assert_eq!(review.issues[0].severity, Severity::High);
        assert_eq!(review.issues[1].severity, Severity::Medium);
        assert_eq!(review.fabricated_claims.len(), 1);
        assert_eq!(review.proposed, Some(VerdictRecommendation::ApproveWithCaution));
    }

    #[test]
    fn test_issue_count_is_capped() {
        let issues: Vec<Value> = (0..50)
            .map(|i| json!({"category": "coherence", "severity": "low", "description": format!("issue {}", i)}))
            .collect();
        let review = reviewer(5)
            .parse_review(json!({"coherence_score": 0.8, "issues": issues}))
            .unwrap();
        assert_eq!(review.issues.len(), 5);
    }

    #[test]
    fn test_malformed_issue_list_keeps_score() {
        let review = reviewer(20)
            .parse_review(json!({"coherence_score": 0.9, "issues": null}))
            .unwrap();
        assert_eq!(review.coherence_score, 0.9);
        assert!(review.issues.is_empty());

        let review = reviewer(20)
            .parse_review(json!({"coherence_score": "0.75", "issues": "none found", "fabricated_claims": null}))
            .unwrap();
        assert_eq!(review.coherence_score, 0.75);
        assert!(review.issues.is_empty());
        assert!(review.fabricated_claims.is_empty());
    }

    #[test]
    fn test_missing_coherence_is_schema_error() {
        let result = reviewer(20).parse_review(json!({"issues": []}));
        assert!(matches!(result, Err(ReviewError::Schema(_))));

        let result = reviewer(20).parse_review(json!(["not", "a", "review"]));
        assert!(matches!(result, Err(ReviewError::Schema(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_timeout() {
        struct Stalled;

        #[async_trait]
        impl CompletionClient for Stalled {
            async fn complete(&self, _prompt: &str, _schema: &Value) -> Result<Value, CollaboratorError> {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(Value::Null)
            }
        }

        let reviewer = GenerativeReviewer::new(Arc::new(Stalled), 500, 20);
        let candidate = Candidate::new(
            "ABC",
            common::MarketContext::new(10.0, chrono::Utc::now()),
        );
        let card = crate::fallback::FallbackGenerator::default().generate(
            &candidate,
            &crate::composer::SignalComposer::default().compose(&candidate),
        );
        let result = reviewer.review(&card, &candidate, Strictness::Standard).await;
        assert!(matches!(result, Err(ReviewError::Timeout(500))));
    }
}
