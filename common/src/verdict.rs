//! Validation verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    LogicError,
    RiskReward,
    PositionSizing,
    Timing,
    CatalystRelevance,
    PriceDrift,
    ConfidenceCalibration,
    Fabrication,
    Coherence,
}

impl IssueCategory {
    /// Lenient parse for categories coming back from a reviewer
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "logic_error" | "logic" => IssueCategory::LogicError,
            "risk_reward" | "risk_reward_ratio" => IssueCategory::RiskReward,
            "position_sizing" | "position_size" => IssueCategory::PositionSizing,
            "timing" => IssueCategory::Timing,
            "catalyst_relevance" | "catalyst" => IssueCategory::CatalystRelevance,
            "price_drift" => IssueCategory::PriceDrift,
            "confidence_calibration" | "confidence" => IssueCategory::ConfidenceCalibration,
            "fabrication" | "fabricated_claim" | "hallucination" => IssueCategory::Fabrication,
            _ => IssueCategory::Coherence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" | "minor" => Some(Severity::Low),
            "medium" | "moderate" => Some(Severity::Medium),
            "high" | "major" => Some(Severity::High),
            "critical" | "severe" => Some(Severity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub description: String,
    pub evidence: String,
    pub suggestion: String,
}

impl Issue {
    pub fn new(
        category: IssueCategory,
        severity: Severity,
        description: impl Into<String>,
        evidence: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            description: description.into(),
            evidence: evidence.into(),
            suggestion: suggestion.into(),
        }
    }
}

/// Outcome of a validation pass, ordered from most to least permissive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictRecommendation {
    Approve,
    ApproveWithCaution,
    Revise,
    Reject,
}

impl VerdictRecommendation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "approve" | "approved" => Some(VerdictRecommendation::Approve),
            "approve_with_caution" | "caution" => Some(VerdictRecommendation::ApproveWithCaution),
            "revise" | "revision" => Some(VerdictRecommendation::Revise),
            "reject" | "rejected" => Some(VerdictRecommendation::Reject),
            _ => None,
        }
    }

    pub fn is_passing(&self) -> bool {
        matches!(self, VerdictRecommendation::Approve | VerdictRecommendation::ApproveWithCaution)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Lenient,
    #[default]
    Standard,
    Strict,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strictness::Lenient => "lenient",
            Strictness::Standard => "standard",
            Strictness::Strict => "strict",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub validation_score: f64, // 0.0 to 1.0
    pub recommendation: VerdictRecommendation,
    pub issues: Vec<Issue>,
    pub strictness: Strictness,
    pub reviewed_at: DateTime<Utc>,
}

impl ValidationVerdict {
    pub fn has_severity(&self, severity: Severity) -> bool {
        self.issues.iter().any(|issue| issue.severity == severity)
    }

    pub fn issues_in(&self, category: IssueCategory) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_ordering() {
        assert!(VerdictRecommendation::Approve < VerdictRecommendation::Revise);
        assert!(VerdictRecommendation::Revise < VerdictRecommendation::Reject);
        assert_eq!(
            VerdictRecommendation::Approve.max(VerdictRecommendation::Revise),
            VerdictRecommendation::Revise
        );
    }

    #[test]
    fn test_lenient_parsing() {
        assert_eq!(IssueCategory::parse("Logic Error"), IssueCategory::LogicError);
        assert_eq!(IssueCategory::parse("something new"), IssueCategory::Coherence);
        assert_eq!(Severity::parse("MAJOR"), Some(Severity::High));
        assert_eq!(Severity::parse("meh"), None);
        assert_eq!(
            VerdictRecommendation::parse("approve with caution"),
            Some(VerdictRecommendation::ApproveWithCaution)
        );
    }

    #[test]
    fn test_serialized_names() {
        let json = serde_json::to_string(&VerdictRecommendation::ApproveWithCaution).unwrap();
        assert_eq!(json, "\"approve_with_caution\"");
        let json = serde_json::to_string(&IssueCategory::LogicError).unwrap();
        assert_eq!(json, "\"logic_error\"");
    }
}
