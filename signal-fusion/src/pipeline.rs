// Trade Card Pipeline
// Composes, gates, synthesizes and validates one cycle of candidates

use crate::cache::ArtifactCache;
use crate::composer::SignalComposer;
use crate::config::{ConfigError, EngineConfig};
use crate::fallback::FallbackGenerator;
use crate::gate::{ConfidenceGate, ScoredCandidate};
use crate::scheduler::BatchScheduler;
use crate::synthesis::Synthesizer;
use crate::validators::{conservative_verdict, is_conservative, Reviewer, Validator};
use common::{
    Candidate, CompositeScore, PipelineFault, Recommendation, Strictness, SynthesisError, ValidationVerdict,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One candidate carried through the whole pipeline
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedCard {
    pub symbol: String,
    pub composite: CompositeScore,
    pub recommendation: Recommendation,
    pub verdict: ValidationVerdict,
    /// Card came from the fallback generator or the verdict is the conservative stand-in
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateRejection {
    pub symbol: String,
    pub composite: f64,
    pub threshold: f64,
}

/// Everything one cycle produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    /// Ranked best first
    pub cards: Vec<EvaluatedCard>,
    pub rejected: Vec<GateRejection>,
    /// Cleared the gate but fell outside the candidate limit
    pub truncated: Vec<String>,
    /// Non-fatal substitutions made along the way
    pub faults: Vec<String>,
}

impl CycleReport {
    pub fn passed(&self) -> impl Iterator<Item = &EvaluatedCard> {
        self.cards.iter().filter(|card| card.verdict.passed)
    }

    pub fn degraded_count(&self) -> usize {
        self.cards.iter().filter(|card| card.degraded).count()
    }
}

/// The fusion engine
pub struct TradeCardEngine {
    composer: SignalComposer,
    gate: ConfidenceGate,
    synthesizer: Arc<dyn Synthesizer>,
    fallback: FallbackGenerator,
    scheduler: BatchScheduler,
    validator: Arc<Validator>,
    cache: ArtifactCache,
    strictness: Strictness,
}

impl TradeCardEngine {
    /// Fails when the configuration would break the score invariants
    pub fn new(
        config: &EngineConfig,
        synthesizer: Arc<dyn Synthesizer>,
        reviewer: Arc<dyn Reviewer>,
        cache: ArtifactCache,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            composer: SignalComposer::new(&config.composer),
            gate: ConfidenceGate::new(&config.gate),
            synthesizer,
            fallback: FallbackGenerator::new(&config.fallback),
            scheduler: BatchScheduler::new(&config.scheduler),
            validator: Arc::new(Validator::new(reviewer, config.validation.clone())),
            cache,
            strictness: config.validation.strictness,
        })
    }

    /// Composite score for a candidate, served from cache within the same hour
    pub async fn score(&self, candidate: &Candidate) -> CompositeScore {
        let bucket = candidate.context.hour_bucket();
        if let Some(cached) = self.cache.composite(&candidate.symbol, &bucket).await {
            return cached;
        }
        let composite = self.composer.compose(candidate);
        self.cache.put_composite(&candidate.symbol, &bucket, &composite).await;
        composite
    }

    pub async fn evaluate(&self, cycle_id: &str, candidates: Vec<Candidate>) -> CycleReport {
        info!(cycle_id, "Evaluating {} candidates", candidates.len());
        let mut report = CycleReport {
            cycle_id: cycle_id.to_string(),
            ..CycleReport::default()
        };

        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let composite = self.score(&candidate).await;
            debug!(symbol = %candidate.symbol, composite = composite.composite, "Composed");
            scored.push(ScoredCandidate { candidate, composite });
        }

        let outcome = self.gate.gate(scored);
        for fault in outcome.rejected {
            if let PipelineFault::ThresholdRejected { symbol, composite, threshold } = fault {
                report.rejected.push(GateRejection { symbol, composite, threshold });
            }
        }
        report.truncated = outcome.truncated.iter().map(|s| s.symbol().to_string()).collect();

        if outcome.survivors.is_empty() {
            info!(cycle_id, "No candidates cleared the gate");
            return report;
        }

        let recommendations = self.synthesize_all(cycle_id, outcome.survivors.clone(), &mut report).await;
        let pairs: Vec<(ScoredCandidate, Recommendation)> =
            outcome.survivors.into_iter().zip(recommendations).collect();
        let verdicts = self.validate_all(pairs.clone(), &mut report).await;

        for ((scored, recommendation), verdict) in pairs.into_iter().zip(verdicts) {
            let degraded = recommendation.is_fallback() || is_conservative(&verdict);
            report.cards.push(EvaluatedCard {
                symbol: scored.candidate.symbol,
                composite: scored.composite,
                recommendation,
                verdict,
                degraded,
            });
        }

        info!(
            cycle_id,
            cards = report.cards.len(),
            passed = report.passed().count(),
            degraded = report.degraded_count(),
            rejected = report.rejected.len(),
            "Cycle complete"
        );
        report
    }

    async fn synthesize_all(
        &self,
        cycle_id: &str,
        survivors: Vec<ScoredCandidate>,
        report: &mut CycleReport,
    ) -> Vec<Recommendation> {
        let synthesizer = self.synthesizer.clone();
        let cache = self.cache.clone();
        let cycle = cycle_id.to_string();

        let results = self
            .scheduler
            .run(
                survivors,
                move |item: Arc<ScoredCandidate>| {
                    let synthesizer = synthesizer.clone();
                    let cache = cache.clone();
                    let cycle = cycle.clone();
                    async move {
                        if let Some(cached) = cache.recommendation(item.symbol(), &cycle).await {
                            return Ok::<_, SynthesisError>(cached);
                        }
                        let recommendation = synthesizer.synthesize(&item.candidate, &item.composite).await?;
                        cache.put_recommendation(&cycle, &recommendation).await;
                        Ok(recommendation)
                    }
                },
                |item: &ScoredCandidate, reason: &str| {
                    warn!(symbol = %item.symbol(), "Synthesis failed, using fallback card: {}", reason);
                    self.fallback.generate(&item.candidate, &item.composite)
                },
            )
            .await;

        results
            .into_iter()
            .map(|result| {
                if let Some(reason) = &result.substituted {
                    report.faults.push(
                        PipelineFault::SynthesisFailure {
                            symbol: result.output.symbol.clone(),
                            reason: reason.clone(),
                        }
                        .to_string(),
                    );
                }
                result.output
            })
            .collect()
    }

    async fn validate_all(
        &self,
        pairs: Vec<(ScoredCandidate, Recommendation)>,
        report: &mut CycleReport,
    ) -> Vec<ValidationVerdict> {
        let validator = self.validator.clone();
        let cache = self.cache.clone();
        let strictness = self.strictness;
        let symbols: Vec<String> = pairs.iter().map(|(scored, _)| scored.candidate.symbol.clone()).collect();

        let results = self
            .scheduler
            .run(
                pairs,
                move |pair: Arc<(ScoredCandidate, Recommendation)>| {
                    let validator = validator.clone();
                    let cache = cache.clone();
                    async move {
                        let (scored, recommendation) = pair.as_ref();
                        let id = recommendation.metadata.id;
                        if let Some(cached) = cache.verdict(id, strictness).await {
                            return Ok::<_, Infallible>(cached);
                        }
                        let candidate = &scored.candidate;
                        let verdict = validator
                            .validate(recommendation, candidate, &candidate.context, strictness)
                            .await;
                        if !is_conservative(&verdict) {
                            cache.put_verdict(id, &verdict).await;
                        }
                        Ok(verdict)
                    }
                },
                |_pair: &(ScoredCandidate, Recommendation), _reason: &str| conservative_verdict(strictness),
            )
            .await;

        results
            .into_iter()
            .zip(symbols)
            .map(|(result, symbol)| {
                if is_conservative(&result.output) {
                    report.faults.push(
                        PipelineFault::ValidationFailure {
                            symbol,
                            reason: result
                                .substituted
                                .clone()
                                .unwrap_or_else(|| "consistency review unavailable".to_string()),
                        }
                        .to_string(),
                    );
                }
                result.output
            })
            .collect()
    }
}
