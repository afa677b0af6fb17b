//! Engine configuration
//!
//! Every tunable of the fusion engine lives here. The gate threshold and the
//! missing-source policy in particular are empirical and expected to be tuned
//! against real signal distributions.

use common::{MissingSourcePolicy, SignalSource, Strictness};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Overall engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub composer: ComposerConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

impl EngineConfig {
    /// Reject settings that would break the score invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.composer.weights;
        for source in SignalSource::ALL {
            let weight = weights.weight(source);
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::Invalid(format!(
                    "weight for {} must be within [0, 1], got {}",
                    source, weight
                )));
            }
        }
        if weights.total() > 1.0 + 1e-9 {
            return Err(ConfigError::Invalid(format!(
                "weights must sum to at most 1.0, got {:.4}",
                weights.total()
            )));
        }

        let unit_fields = [
            ("gate.threshold", self.gate.threshold),
            ("fallback.confidence", self.fallback.confidence),
            ("validation.approve_threshold", self.validation.approve_threshold),
            ("validation.reject_threshold", self.validation.reject_threshold),
            ("validation.local_weight", self.validation.local_weight),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }

        if self.validation.approve_threshold < self.validation.reject_threshold {
            return Err(ConfigError::Invalid(
                "validation.approve_threshold must not be below validation.reject_threshold".to_string(),
            ));
        }
        if self.scheduler.batch_size == 0 || self.scheduler.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.batch_size and scheduler.max_concurrency must be positive".to_string(),
            ));
        }
        if self.fallback.stop_offset_pct <= 0.0 || self.fallback.target_offset_pct <= 0.0 {
            return Err(ConfigError::Invalid("fallback offsets must be positive".to_string()));
        }

        Ok(())
    }
}

/// Per-source weights applied by the composer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    #[serde(default = "default_technical_weight")]
    pub technical: f64,
    #[serde(default = "default_sentiment_weight")]
    pub sentiment: f64,
    #[serde(default = "default_risk_weight")]
    pub risk: f64,
    #[serde(default = "default_sector_weight")]
    pub sector: f64,
    #[serde(default = "default_anomaly_weight")]
    pub anomaly: f64,
    #[serde(default)]
    pub earnings_timing: f64,
}

impl WeightTable {
    pub fn weight(&self, source: SignalSource) -> f64 {
        match source {
            SignalSource::Technical => self.technical,
            SignalSource::Sentiment => self.sentiment,
            SignalSource::Risk => self.risk,
            SignalSource::Sector => self.sector,
            SignalSource::Anomaly => self.anomaly,
            SignalSource::EarningsTiming => self.earnings_timing,
        }
    }

    pub fn total(&self) -> f64 {
        SignalSource::ALL.iter().map(|source| self.weight(*source)).sum()
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            technical: 0.30,
            sentiment: 0.25,
            risk: 0.20,
            sector: 0.15,
            anomaly: 0.10,
            earnings_timing: 0.0,
        }
    }
}

fn default_technical_weight() -> f64 {
    0.30
}

fn default_sentiment_weight() -> f64 {
    0.25
}

fn default_risk_weight() -> f64 {
    0.20
}

fn default_sector_weight() -> f64 {
    0.15
}

fn default_anomaly_weight() -> f64 {
    0.10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposerConfig {
    #[serde(default)]
    pub weights: WeightTable,

    #[serde(default)]
    pub missing_source_policy: MissingSourcePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum composite score a candidate needs before synthesis
    #[serde(default = "default_gate_threshold")]
    pub threshold: f64,

    /// Keep only the best N survivors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_candidates: Option<usize>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.45,
            max_candidates: None,
        }
    }
}

fn default_gate_threshold() -> f64 {
    0.45
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Model name sent to the generative collaborator and stamped on cards
    #[serde(default = "default_synthesis_model")]
    pub model: String,

    #[serde(default = "default_call_timeout_ms")]
    pub timeout_ms: u64,

    /// Hard cap on prompt length (characters)
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,

    /// Narrative fragments longer than this are truncated
    #[serde(default = "default_max_fragment_chars")]
    pub max_fragment_chars: usize,

    #[serde(default = "default_max_fragments_per_source")]
    pub max_fragments_per_source: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            model: default_synthesis_model(),
            timeout_ms: default_call_timeout_ms(),
            max_prompt_chars: default_max_prompt_chars(),
            max_fragment_chars: default_max_fragment_chars(),
            max_fragments_per_source: default_max_fragments_per_source(),
        }
    }
}

fn default_synthesis_model() -> String {
    "trade-card-synthesis".to_string()
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_max_prompt_chars() -> usize {
    6_000
}

fn default_max_fragment_chars() -> usize {
    240
}

fn default_max_fragments_per_source() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Confidence stamped on rule-based cards, kept within [0.2, 0.3]
    #[serde(default = "default_fallback_confidence")]
    pub confidence: f64,

    /// Stop distance from price when no level is known
    #[serde(default = "default_stop_offset_pct")]
    pub stop_offset_pct: f64,

    /// Target distance from price when no level is known
    #[serde(default = "default_target_offset_pct")]
    pub target_offset_pct: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            confidence: default_fallback_confidence(),
            stop_offset_pct: default_stop_offset_pct(),
            target_offset_pct: default_target_offset_pct(),
        }
    }
}

fn default_fallback_confidence() -> f64 {
    0.25
}

fn default_stop_offset_pct() -> f64 {
    0.03
}

fn default_target_offset_pct() -> f64 {
    0.06
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent calls allowed inside one batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Pause between batches, the only pacing against collaborator rate limits
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    3
}

fn default_inter_batch_delay_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entries held by the in-process store
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_composite_ttl")]
    pub composite_ttl_secs: u64,

    #[serde(default = "default_recommendation_ttl")]
    pub recommendation_ttl_secs: u64,

    #[serde(default = "default_verdict_ttl")]
    pub verdict_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            composite_ttl_secs: default_composite_ttl(),
            recommendation_ttl_secs: default_recommendation_ttl(),
            verdict_ttl_secs: default_verdict_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    1_024
}

fn default_composite_ttl() -> u64 {
    3_600
}

fn default_recommendation_ttl() -> u64 {
    1_800
}

fn default_verdict_ttl() -> u64 {
    1_800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub strictness: Strictness,

    /// Score at or above which a card without critical issues is approved
    #[serde(default = "default_approve_threshold")]
    pub approve_threshold: f64,

    /// Score below which a card is always rejected
    #[serde(default = "default_reject_threshold")]
    pub reject_threshold: f64,

    /// Share of the final score taken from the local checks
    #[serde(default = "default_local_weight")]
    pub local_weight: f64,

    /// Allowed relative gap between entry and the latest market price
    #[serde(default = "default_max_entry_drift_pct")]
    pub max_entry_drift_pct: f64,

    /// Allowed relative gap between stated and recomputed risk/reward
    #[serde(default = "default_risk_reward_tolerance")]
    pub risk_reward_tolerance: f64,

    /// How far self-reported confidence may exceed the composite
    #[serde(default = "default_confidence_gap")]
    pub max_confidence_gap: f64,

    /// Issues accepted from one review response
    #[serde(default = "default_max_review_issues")]
    pub max_review_issues: usize,

    #[serde(default = "default_review_model")]
    pub review_model: String,

    #[serde(default = "default_call_timeout_ms")]
    pub review_timeout_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strictness: Strictness::Standard,
            approve_threshold: default_approve_threshold(),
            reject_threshold: default_reject_threshold(),
            local_weight: default_local_weight(),
            max_entry_drift_pct: default_max_entry_drift_pct(),
            risk_reward_tolerance: default_risk_reward_tolerance(),
            max_confidence_gap: default_confidence_gap(),
            max_review_issues: default_max_review_issues(),
            review_model: default_review_model(),
            review_timeout_ms: default_call_timeout_ms(),
        }
    }
}

fn default_approve_threshold() -> f64 {
    0.70
}

fn default_reject_threshold() -> f64 {
    0.40
}

fn default_local_weight() -> f64 {
    0.6
}

fn default_max_entry_drift_pct() -> f64 {
    0.05
}

fn default_risk_reward_tolerance() -> f64 {
    0.10
}

fn default_confidence_gap() -> f64 {
    0.30
}

fn default_max_review_issues() -> usize {
    20
}

fn default_review_model() -> String {
    "trade-card-review".to_string()
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> anyhow::Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to TOML file
pub fn save_config(config: &EngineConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Create a default configuration file template
pub fn create_config_template(path: &str) -> anyhow::Result<()> {
    let template = "# Signal Fusion Engine Configuration

[composer]
# zero_fill: a missing source contributes nothing and keeps its weight slot
# renormalize: divide by the total weight of the sources that reported
missing_source_policy = \"zero_fill\"

[composer.weights]
technical = 0.30
sentiment = 0.25
risk = 0.20
sector = 0.15
anomaly = 0.10
earnings_timing = 0.0

[gate]
# Minimum composite score before synthesis is attempted
threshold = 0.45
# Keep only the best N survivors (omit for no limit)
# max_candidates = 10

[synthesis]
model = \"trade-card-synthesis\"
timeout_ms = 30000
max_prompt_chars = 6000
max_fragment_chars = 240
max_fragments_per_source = 3

[fallback]
# Confidence of rule-based cards (0.2 - 0.3)
confidence = 0.25
stop_offset_pct = 0.03
target_offset_pct = 0.06

[scheduler]
batch_size = 3
max_concurrency = 3
# Pause between batches (milliseconds)
inter_batch_delay_ms = 2000

[cache]
enabled = true
capacity = 1024
composite_ttl_secs = 3600
recommendation_ttl_secs = 1800
verdict_ttl_secs = 1800

[validation]
# lenient | standard | strict
strictness = \"standard\"
approve_threshold = 0.70
reject_threshold = 0.40
local_weight = 0.6
max_entry_drift_pct = 0.05
risk_reward_tolerance = 0.10
max_confidence_gap = 0.30
max_review_issues = 20
review_model = \"trade-card-review\"
review_timeout_ms = 30000
";

    std::fs::write(path, template)?;
    Ok(())
}
