//! Orchestrator - queries analytical agents and assembles candidates
//!
//! For every symbol the orchestrator asks each registered agent for a signal,
//! concurrently and under a per-agent timeout. Whatever comes back is placed
//! in the candidate's signal map; disabled, failing or slow agents leave their
//! slot empty and are reported as `UpstreamSignalMissing`.

use super::agent::{Agent, AgentInput};
use chrono::Utc;
use common::{Candidate, MarketContext, PipelineFault};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of symbols being collected concurrently
    pub max_concurrent_symbols: usize,
    /// Default time an agent gets to answer (milliseconds)
    pub agent_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_symbols: 10,
            agent_timeout_ms: 10_000,
        }
    }
}

/// A candidate plus the sources that could not be filled in
#[derive(Debug, Clone)]
pub struct CollectedCandidate {
    pub candidate: Candidate,
    pub faults: Vec<PipelineFault>,
}

/// Orchestrator - coordinates the analytical agents
pub struct Orchestrator {
    config: OrchestratorConfig,

    // Registered agents, keyed by agent id
    agents: DashMap<String, Arc<dyn Agent>>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            agents: DashMap::new(),
        }
    }

    /// Register an agent, replacing any agent with the same id
    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        let agent_id = agent.config().agent_id.clone();
        info!(agent_id = %agent_id, source = %agent.source(), "Registering agent");
        if self.agents.insert(agent_id.clone(), agent).is_some() {
            warn!(agent_id = %agent_id, "Replaced previously registered agent");
        }
    }

    /// Unregister an agent
    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        info!(agent_id = %agent_id, "Unregistering agent");
        self.agents.remove(agent_id).is_some()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Agents sorted by id, so duplicate sources resolve the same way every time
    fn agent_snapshot(&self) -> Vec<Arc<dyn Agent>> {
        let mut agents: Vec<(String, Arc<dyn Agent>)> = self
            .agents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        agents.sort_by(|a, b| a.0.cmp(&b.0));
        agents.into_iter().map(|(_, agent)| agent).collect()
    }

    /// Build one candidate from all registered agents
    pub async fn collect(&self, symbol: &str, context: MarketContext) -> CollectedCandidate {
        let agents = self.agent_snapshot();
        collect_with(agents, symbol.to_string(), context, self.config.agent_timeout_ms).await
    }

    /// Build candidates for many symbols, bounded by `max_concurrent_symbols`
    ///
    /// Output order matches `requests` order.
    pub async fn collect_all(&self, requests: Vec<(String, MarketContext)>) -> Vec<CollectedCandidate> {
        let agents = self.agent_snapshot();
        if agents.is_empty() {
            debug!("No agents registered, candidates will carry no signals");
        }

        info!("Collecting signals for {} symbols from {} agents", requests.len(), agents.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_symbols.max(1)));
        let timeout_ms = self.config.agent_timeout_ms;
        let mut tasks = Vec::with_capacity(requests.len());

        for (symbol, context) in requests {
            let semaphore = semaphore.clone();
            let agents = agents.clone();
            let fallback = Candidate::new(symbol.clone(), context.clone());

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                collect_with(agents, symbol, context, timeout_ms).await
            });

            tasks.push((fallback, task));
        }

        let mut collected = Vec::with_capacity(tasks.len());
        for (fallback, task) in tasks {
            match task.await {
                Ok(result) => collected.push(result),
                Err(e) => {
                    warn!(symbol = %fallback.symbol, "Collection task failed: {}", e);
                    let faults = fallback
                        .missing_sources()
                        .into_iter()
                        .map(|source| PipelineFault::UpstreamSignalMissing {
                            symbol: fallback.symbol.clone(),
                            source,
                            reason: format!("collection task failed: {}", e),
                        })
                        .collect();
                    collected.push(CollectedCandidate { candidate: fallback, faults });
                }
            }
        }

        collected
    }
}

async fn collect_with(
    agents: Vec<Arc<dyn Agent>>,
    symbol: String,
    context: MarketContext,
    default_timeout_ms: u64,
) -> CollectedCandidate {
    let input = AgentInput {
        symbol: symbol.clone(),
        context: Arc::new(context.clone()),
        timestamp: Utc::now(),
    };

    let calls = agents.iter().map(|agent| {
        let input = &input;
        async move {
            if !agent.is_available() {
                return (agent.clone(), Err("agent disabled or paused".to_string()));
            }
            let timeout_ms = agent.config().timeout_ms.unwrap_or(default_timeout_ms);
            let outcome = match tokio::time::timeout(Duration::from_millis(timeout_ms), agent.analyze(input)).await {
                Ok(Ok(signal)) => Ok(signal),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {} ms", timeout_ms)),
            };
            (agent.clone(), outcome)
        }
    });

    let mut candidate = Candidate::new(symbol.clone(), context);
    let mut faults = Vec::new();

    for (agent, outcome) in join_all(calls).await {
        let source = agent.source();
        match outcome {
            Ok(signal) if signal.source != source => {
                warn!(
                    symbol = %symbol,
                    agent_id = %agent.config().agent_id,
                    "Agent declared {} but returned a {} signal, discarding",
                    source,
                    signal.source
                );
            }
            Ok(signal) => {
                if candidate.signals.contains_key(&source) {
                    debug!(symbol = %symbol, source = %source, "Duplicate source, keeping first");
                    continue;
                }
                candidate.signals.insert(source, signal);
            }
            Err(reason) => {
                debug!(symbol = %symbol, source = %source, "Signal unavailable: {}", reason);
                faults.push(PipelineFault::UpstreamSignalMissing {
                    symbol: symbol.clone(),
                    source,
                    reason,
                });
            }
        }
    }

    // Another agent for the same source may have filled the slot
    faults.retain(|fault| match fault {
        PipelineFault::UpstreamSignalMissing { source, .. } => !candidate.signals.contains_key(source),
        _ => true,
    });

    // Sources with no agent at all are also missing
    for source in candidate.missing_sources() {
        let already_reported = faults.iter().any(|fault| {
            matches!(fault, PipelineFault::UpstreamSignalMissing { source: s, .. } if *s == source)
        });
        if !already_reported {
            faults.push(PipelineFault::UpstreamSignalMissing {
                symbol: symbol.clone(),
                source,
                reason: "no signal received".to_string(),
            });
        }
    }

    CollectedCandidate { candidate, faults }
}
