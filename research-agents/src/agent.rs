//! Base Agent trait and core agent types
//!
//! Every analytical source (technical, sentiment, risk, ...) implements the
//! Agent trait. How an agent reaches its score is its own business; the
//! orchestrator only relies on the `AnalyticalSignal` it returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AnalyticalSignal, MarketContext, SignalSource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Base configuration for any agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,
    pub enabled: bool,
    /// Overrides the orchestrator-wide timeout for this agent
    pub timeout_ms: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: Uuid::new_v4().to_string(),
            name: "UnnamedAgent".to_string(),
            enabled: true,
            timeout_ms: None,
        }
    }
}

/// Input data for agent processing
#[derive(Debug, Clone)]
pub struct AgentInput {
    pub symbol: String,
    pub context: Arc<MarketContext>,
    pub timestamp: DateTime<Utc>,
}

/// Current status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Paused,
}

/// Base trait that all analytical sources implement
#[async_trait]
pub trait Agent: Send + Sync {
    /// Get the agent's configuration
    fn config(&self) -> &AgentConfig;

    /// The analysis category this agent reports on
    fn source(&self) -> SignalSource;

    /// Get the current status of the agent
    fn status(&self) -> AgentStatus {
        AgentStatus::Idle
    }

    /// Analyze one symbol
    ///
    /// Errors are not fatal to the caller: the slot for this source is simply
    /// left empty on the candidate.
    async fn analyze(&self, input: &AgentInput) -> anyhow::Result<AnalyticalSignal>;

    /// Whether the orchestrator should call this agent at all
    fn is_available(&self) -> bool {
        self.config().enabled && self.status() != AgentStatus::Paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DummyAgent {
        config: AgentConfig,
        status: AgentStatus,
    }

    #[async_trait]
    impl Agent for DummyAgent {
        fn config(&self) -> &AgentConfig {
            &self.config
        }

        fn source(&self) -> SignalSource {
            SignalSource::Sector
        }

        fn status(&self) -> AgentStatus {
            self.status
        }

        async fn analyze(&self, _input: &AgentInput) -> anyhow::Result<AnalyticalSignal> {
            Ok(AnalyticalSignal::new(SignalSource::Sector, 0.5))
        }
    }

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert!(config.enabled);
        assert!(config.timeout_ms.is_none());
        assert!(!config.agent_id.is_empty());
    }

    #[test]
    fn test_availability() {
        let mut agent = DummyAgent {
            config: AgentConfig::default(),
            status: AgentStatus::Idle,
        };
        assert!(agent.is_available());

        agent.status = AgentStatus::Paused;
        assert!(!agent.is_available());

        agent.status = AgentStatus::Idle;
        agent.config.enabled = false;
        assert!(!agent.is_available());
    }
}
