// Confidence Gate
// Ranks candidates by composite score and stops weak ones before synthesis

use crate::config::GateConfig;
use common::{Candidate, CompositeScore, PipelineFault};
use std::cmp::Ordering;
use tracing::{debug, info};

/// A candidate together with its composite score
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub composite: CompositeScore,
}

impl ScoredCandidate {
    pub fn symbol(&self) -> &str {
        &self.candidate.symbol
    }

    pub fn score(&self) -> f64 {
        self.composite.composite
    }
}

/// Result of gating one cycle's candidates
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    /// Ranked best first
    pub survivors: Vec<ScoredCandidate>,
    /// Below threshold; never synthesized
    pub rejected: Vec<PipelineFault>,
    /// Cleared the threshold but fell outside `max_candidates`
    pub truncated: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone)]
pub struct ConfidenceGate {
    threshold: f64,
    max_candidates: Option<usize>,
}

impl ConfidenceGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            threshold: config.threshold,
            max_candidates: config.max_candidates,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn admits(&self, composite: &CompositeScore) -> bool {
        composite.composite >= self.threshold
    }

    pub fn gate(&self, scored: Vec<ScoredCandidate>) -> GateOutcome {
        let mut ranked = scored;
        ranked.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.symbol().cmp(b.symbol()))
        });

        let mut outcome = GateOutcome::default();
        for item in ranked {
            if self.admits(&item.composite) {
                outcome.survivors.push(item);
            } else {
                debug!(
                    symbol = %item.symbol(),
                    composite = item.score(),
                    threshold = self.threshold,
                    "Candidate below gate"
                );
                outcome.rejected.push(PipelineFault::ThresholdRejected {
                    symbol: item.candidate.symbol.clone(),
                    composite: item.score(),
                    threshold: self.threshold,
                });
            }
        }

        if let Some(limit) = self.max_candidates {
            if outcome.survivors.len() > limit {
                outcome.truncated = outcome.survivors.split_off(limit);
            }
        }

        info!(
            "Gate passed {} candidates ({} rejected, {} truncated)",
            outcome.survivors.len(),
            outcome.rejected.len(),
            outcome.truncated.len()
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{MarketContext, MissingSourcePolicy};
    use std::collections::BTreeMap;

    fn scored(symbol: &str, composite: f64) -> ScoredCandidate {
        ScoredCandidate {
            candidate: Candidate::new(symbol, MarketContext::new(10.0, Utc::now())),
            composite: CompositeScore {
                contributions: BTreeMap::new(),
                composite,
                policy: MissingSourcePolicy::ZeroFill,
                missing: Vec::new(),
            },
        }
    }

    fn gate(threshold: f64, max_candidates: Option<usize>) -> ConfidenceGate {
        ConfidenceGate::new(&GateConfig { threshold, max_candidates })
    }

    #[test]
    fn test_single_source_candidate_is_rejected() {
        let outcome = gate(0.45, None).gate(vec![scored("LONE", 0.27)]);
        assert!(outcome.survivors.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert!(matches!(
            &outcome.rejected[0],
            PipelineFault::ThresholdRejected { symbol, .. } if symbol == "LONE"
        ));
    }

    #[test]
    fn test_ranks_descending_and_keeps_threshold_inclusive() {
        let outcome = gate(0.45, None).gate(vec![
            scored("MID", 0.52),
            scored("EDGE", 0.45),
            scored("TOP", 0.599),
            scored("LOW", 0.2),
        ]);
        let symbols: Vec<&str> = outcome.survivors.iter().map(|s| s.symbol()).collect();
        assert_eq!(symbols, vec!["TOP", "MID", "EDGE"]);
        assert_eq!(outcome.rejected.len(), 1);
    }

    #[test]
    fn test_truncates_to_max_candidates() {
        let outcome = gate(0.1, Some(2)).gate(vec![
            scored("A", 0.3),
            scored("B", 0.9),
            scored("C", 0.6),
        ]);
        let symbols: Vec<&str> = outcome.survivors.iter().map(|s| s.symbol()).collect();
        assert_eq!(symbols, vec!["B", "C"]);
        assert_eq!(outcome.truncated.len(), 1);
        assert_eq!(outcome.truncated[0].symbol(), "A");
    }

    #[test]
    fn test_ties_break_by_symbol() {
        let outcome = gate(0.0, None).gate(vec![scored("ZZZ", 0.5), scored("AAA", 0.5)]);
        assert_eq!(outcome.survivors[0].symbol(), "AAA");
    }
}
