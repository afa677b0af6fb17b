//! Research Agents - analytical signal sources
//!
//! This crate provides the upstream side of signal fusion:
//! - Base Agent trait implemented once per analysis category
//! - Orchestrator that queries every registered agent for a batch of symbols
//!   and assembles the resulting `Candidate`s, tolerating absent or failing sources

pub mod agent;
pub mod orchestrator;

// Re-export commonly used types
pub use agent::{Agent, AgentConfig, AgentInput, AgentStatus};
pub use orchestrator::{CollectedCandidate, Orchestrator, OrchestratorConfig};

// Re-export common types for convenience
pub use common::{AnalyticalSignal, Candidate, MarketContext, SignalSource};
