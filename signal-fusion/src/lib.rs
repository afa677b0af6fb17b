// Signal Fusion Engine
// Turns per-source analytical signals into validated trade cards

pub mod cache;
pub mod composer;
pub mod config;
pub mod fallback;
pub mod gate;
pub mod http_client;
pub mod payload;
pub mod pipeline;
pub mod scheduler;
pub mod synthesis;
pub mod validators;

pub use cache::{ArtifactCache, CacheStore, InMemoryCache, RedisCache};
pub use composer::SignalComposer;
pub use config::{
    create_config_template, load_config, save_config, CacheConfig, ComposerConfig, ConfigError, EngineConfig,
    FallbackConfig, GateConfig, SchedulerConfig, SynthesisConfig, ValidationConfig, WeightTable,
};
pub use fallback::FallbackGenerator;
pub use gate::{ConfidenceGate, GateOutcome, ScoredCandidate};
pub use http_client::HttpCompletionClient;
pub use pipeline::{CycleReport, EvaluatedCard, GateRejection, TradeCardEngine};
pub use scheduler::{BatchResult, BatchScheduler};
pub use synthesis::{CompletionClient, GenerativeSynthesizer, Synthesizer};
pub use validators::{
    conservative_verdict, CardCheck, CheckContext, ConsistencyReview, GenerativeReviewer, Reviewer, Validator,
};
