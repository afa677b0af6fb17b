//! Shared types for the signal fusion workspace
//!
//! Everything that crosses a crate boundary lives here: analytical signals and
//! the candidates built from them, the trade card produced by synthesis, the
//! validation verdict wrapped around it, and the error taxonomy.

pub mod candidate;
pub mod error;
pub mod logging;
pub mod recommendation;
pub mod signal;
pub mod verdict;

pub use candidate::{Candidate, MarketContext};
pub use error::{CacheError, CollaboratorError, PipelineFault, ReviewError, SynthesisError};
pub use recommendation::{
    CompositeScore, ExecutionPlan, MissingSourcePolicy, Recommendation, RecommendationMetadata,
    RiskGrade, SetupType, TimingPlan, TradeCardHeader, TradeDirection, TradeNarrative, TradeType,
    Urgency, FALLBACK_MODEL,
};
pub use signal::{AnalyticalSignal, SignalSource};
pub use verdict::{Issue, IssueCategory, Severity, Strictness, ValidationVerdict, VerdictRecommendation};

pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

/// Clamp a score into [0, 1]. Non-finite input maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
