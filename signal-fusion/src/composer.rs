// Signal Composer
// Fuses the per-source signals of a candidate into one bounded score

use crate::config::{ComposerConfig, WeightTable};
use common::{clamp_unit, Candidate, CompositeScore, MissingSourcePolicy, SignalSource};
use std::collections::BTreeMap;

/// Weighted fusion of analytical signals
///
/// `compose` is a pure function of the candidate: same signals in, same bits
/// out. Sources are visited in a fixed order so the floating point sum never
/// depends on map iteration.
#[derive(Debug, Clone, Default)]
pub struct SignalComposer {
    weights: WeightTable,
    policy: MissingSourcePolicy,
}

impl SignalComposer {
    pub fn new(config: &ComposerConfig) -> Self {
        Self {
            weights: config.weights.clone(),
            policy: config.missing_source_policy,
        }
    }

    pub fn policy(&self) -> MissingSourcePolicy {
        self.policy
    }

    pub fn compose(&self, candidate: &Candidate) -> CompositeScore {
        let mut contributions = BTreeMap::new();
        let mut missing = Vec::new();
        let mut present_weight = 0.0;

        for source in SignalSource::ALL {
            let weight = self.weights.weight(source);
            match candidate.signal(source) {
                Some(signal) => {
                    present_weight += weight;
                    contributions.insert(source, weight * signal.bounded_score());
                }
                None => {
                    missing.push(source);
                    contributions.insert(source, 0.0);
                }
            }
        }

        if self.policy == MissingSourcePolicy::Renormalize {
            if present_weight > 0.0 {
                for contribution in contributions.values_mut() {
                    *contribution /= present_weight;
                }
            } else {
                contributions.values_mut().for_each(|c| *c = 0.0);
            }
        }

        let composite = clamp_unit(contributions.values().sum());

        CompositeScore {
            contributions,
            composite,
            policy: self.policy,
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{AnalyticalSignal, MarketContext};

    fn candidate(signals: &[(SignalSource, f64)]) -> Candidate {
        signals.iter().fold(
            Candidate::new("TEST", MarketContext::new(100.0, Utc::now())),
            |candidate, (source, score)| candidate.with_signal(AnalyticalSignal::new(*source, *score)),
        )
    }

    fn composer(policy: MissingSourcePolicy) -> SignalComposer {
        SignalComposer::new(&ComposerConfig {
            weights: WeightTable::default(),
            missing_source_policy: policy,
        })
    }

    #[test]
    fn test_zero_fill_single_source() {
        let score = composer(MissingSourcePolicy::ZeroFill)
            .compose(&candidate(&[(SignalSource::Technical, 0.9)]));

        assert!((score.composite - 0.27).abs() < 1e-12);
        assert_eq!(score.missing.len(), 5);
        assert_eq!(score.contributions[&SignalSource::Sentiment], 0.0);
    }

    #[test]
    fn test_four_source_example() {
        let score = composer(MissingSourcePolicy::ZeroFill).compose(&candidate(&[
            (SignalSource::Technical, 0.75),
            (SignalSource::Sentiment, 0.68),
            (SignalSource::Risk, 0.60),
            (SignalSource::Sector, 0.56),
        ]));

        assert!((score.composite - 0.599).abs() < 1e-9);
    }

    #[test]
    fn test_renormalize_redistributes_missing_weight() {
        let score = composer(MissingSourcePolicy::Renormalize)
            .compose(&candidate(&[(SignalSource::Technical, 0.9)]));

        assert!((score.composite - 0.9).abs() < 1e-12);
        assert_eq!(score.policy, MissingSourcePolicy::Renormalize);
    }

    #[test]
    fn test_renormalize_with_nothing_present() {
        let score = composer(MissingSourcePolicy::Renormalize).compose(&candidate(&[]));
        assert_eq!(score.composite, 0.0);
        assert_eq!(score.missing.len(), SignalSource::ALL.len());
    }

    #[test]
    fn test_contributions_sum_to_composite() {
        for policy in [MissingSourcePolicy::ZeroFill, MissingSourcePolicy::Renormalize] {
            let score = composer(policy).compose(&candidate(&[
                (SignalSource::Technical, 0.31),
                (SignalSource::Risk, 0.97),
                (SignalSource::Anomaly, 0.44),
                (SignalSource::EarningsTiming, 0.8),
            ]));
            let sum: f64 = score.contributions.values().sum();
            assert!((sum - score.composite).abs() < 1e-9);
            assert!((0.0..=1.0).contains(&score.composite));
        }
    }

    #[test]
    fn test_out_of_range_scores_are_bounded() {
        let mut input = candidate(&[]);
        let mut wild = AnalyticalSignal::new(SignalSource::Technical, 0.5);
        wild.score = 7.5;
        input.signals.insert(SignalSource::Technical, wild);

        let score = composer(MissingSourcePolicy::ZeroFill).compose(&input);
        assert!((score.composite - 0.30).abs() < 1e-12);
    }

    #[test]
    fn test_compose_is_idempotent() {
        let input = candidate(&[
            (SignalSource::Technical, 0.123456789),
            (SignalSource::Sentiment, 0.987654321),
            (SignalSource::Sector, 0.5),
        ]);
        let composer = composer(MissingSourcePolicy::ZeroFill);
        let first = composer.compose(&input);
        let second = composer.compose(&input);

        assert_eq!(first.composite.to_bits(), second.composite.to_bits());
        assert_eq!(first, second);
    }
}
