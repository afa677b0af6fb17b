// Recommendation Synthesizer
// Asks a generative collaborator for a trade card and defends against what comes back

use crate::config::SynthesisConfig;
use crate::payload::{
    lenient_f64, lenient_object, lenient_string, lenient_strings, parse_direction, parse_risk_grade, parse_setup_type,
    parse_trade_type, parse_urgency, truncate_chars,
};
use async_trait::async_trait;
use common::recommendation::implied_risk_reward;
use common::{
    clamp_unit, Candidate, CollaboratorError, CompositeScore, ExecutionPlan, Recommendation,
    RecommendationMetadata, RiskGrade, SignalSource, SynthesisError, TimingPlan, TradeCardHeader,
    TradeDirection, TradeNarrative,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Generative collaborator: prompt plus output schema in, structured JSON out
///
/// Output is neither deterministic nor guaranteed to match the schema.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, output_schema: &Value) -> Result<Value, CollaboratorError>;
}

/// Produces a trade card for a gated candidate
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(
        &self,
        candidate: &Candidate,
        composite: &CompositeScore,
    ) -> Result<Recommendation, SynthesisError>;
}

/// Synthesizer backed by a `CompletionClient`
pub struct GenerativeSynthesizer {
    client: Arc<dyn CompletionClient>,
    config: SynthesisConfig,
}

impl GenerativeSynthesizer {
    pub fn new(client: Arc<dyn CompletionClient>, config: SynthesisConfig) -> Self {
        Self { client, config }
    }

    /// Bounded prompt describing the candidate and its fused signals
    pub fn build_prompt(&self, candidate: &Candidate, composite: &CompositeScore) -> String {
        let ctx = &candidate.context;
        let mut prompt = String::new();

        let _ = writeln!(
            prompt,
            "Produce a trade card for {} as JSON matching the provided schema.",
            candidate.symbol
        );
        let _ = writeln!(prompt, "Current price: {:.4}", ctx.current_price);
        if let Some(sector) = &ctx.sector {
            let _ = writeln!(prompt, "Sector: {}", sector);
        }
        if let Some(atr) = ctx.atr {
            let _ = writeln!(prompt, "ATR: {:.4}", atr);
        }
        let _ = writeln!(prompt, "Support levels: {}", format_levels(&ctx.support_levels));
        let _ = writeln!(prompt, "Resistance levels: {}", format_levels(&ctx.resistance_levels));
        let _ = writeln!(
            prompt,
            "Composite confidence: {:.3} ({} sources missing)",
            composite.composite,
            composite.missing.len()
        );

        for source in SignalSource::ALL {
            let Some(signal) = candidate.signal(source) else {
                let _ = writeln!(prompt, "- {}: unavailable", source);
                continue;
            };
            let weighted = composite.contributions.get(&source).copied().unwrap_or(0.0);
            let _ = write!(
                prompt,
                "- {}: score {:.2}, weighted {:.3}",
                source,
                signal.bounded_score(),
                weighted
            );
            if !signal.subscores.is_empty() {
                let subscores: Vec<String> = signal
                    .subscores
                    .iter()
                    .take(8)
                    .map(|(name, value)| format!("{}={:.2}", name, value))
                    .collect();
                let _ = write!(prompt, "; {}", subscores.join(", "));
            }
            prompt.push('\n');
            for fragment in signal.narrative.iter().take(self.config.max_fragments_per_source) {
                let _ = writeln!(prompt, "    * {}", truncate_chars(fragment, self.config.max_fragment_chars));
            }
        }

        prompt.push_str(
            "Rules: long cards need target > entry > stop, short cards need target < entry < stop. \
             Position size is a fraction of capital. Do not invent catalysts absent from the inputs.\n",
        );

        truncate_chars(&prompt, self.config.max_prompt_chars)
    }

    /// JSON schema handed to the collaborator
    pub fn output_schema() -> Value {
        json!({
            "type": "object",
            "required": ["header", "narrative", "execution"],
            "properties": {
                "header": {
                    "type": "object",
                    "required": ["confidence", "trade_type", "direction"],
                    "properties": {
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                        "trade_type": {"enum": ["scalp", "day_trade", "swing", "position"]},
                        "timeframe": {"type": "string"},
                        "direction": {"enum": ["long", "short"]},
                        "risk_grade": {"enum": ["low", "medium", "high", "very_high"]}
                    }
                },
                "narrative": {
                    "type": "object",
                    "required": ["setup", "setup_type", "catalyst"],
                    "properties": {
                        "setup": {"type": "string"},
                        "setup_type": {"enum": ["breakout", "pullback", "reversal", "momentum", "support_resistance", "earnings_play"]},
                        "catalyst": {"type": "string"},
                        "timing": {
                            "type": "object",
                            "properties": {
                                "urgency": {"enum": ["immediate", "today", "this_week", "patient"]},
                                "entry_window": {"type": "string"}
                            }
                        },
                        "confirmation": {"type": "string"}
                    }
                },
                "execution": {
                    "type": "object",
                    "required": ["entry_price", "target_price", "stop_loss"],
                    "properties": {
                        "entry_price": {"type": "number"},
                        "target_price": {"type": "number"},
                        "stop_loss": {"type": "number"},
                        "position_size": {"type": "number"},
                        "risk_reward_ratio": {"type": "number"}
                    }
                },
                "counter_signals": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    /// Turn a raw collaborator payload into a trade card, or refuse it whole
    pub fn parse_response(
        &self,
        candidate: &Candidate,
        composite: &CompositeScore,
        payload: Value,
    ) -> Result<Recommendation, SynthesisError> {
        let payload = match payload {
            Value::Object(mut map) if map.contains_key("trade_card") => {
                map.remove("trade_card").unwrap_or(Value::Null)
            }
            other => other,
        };
        let raw: RawTradeCard =
            serde_json::from_value(payload).map_err(|e| SynthesisError::Schema(e.to_string()))?;

        let confidence = raw.header.confidence.map(clamp_unit).ok_or_else(|| missing("header.confidence"))?;
        let trade_type = raw
            .header
            .trade_type
            .as_deref()
            .and_then(parse_trade_type)
            .ok_or_else(|| missing("header.trade_type"))?;
        let setup = raw.narrative.setup.ok_or_else(|| missing("narrative.setup"))?;
        let setup_type = raw
            .narrative
            .setup_type
            .as_deref()
            .and_then(parse_setup_type)
            .ok_or_else(|| missing("narrative.setup_type"))?;
        let catalyst = raw.narrative.catalyst.ok_or_else(|| missing("narrative.catalyst"))?;

        let entry = positive_price(raw.execution.entry_price, "execution.entry_price")?;
        let target = positive_price(raw.execution.target_price, "execution.target_price")?;
        let stop = positive_price(raw.execution.stop_loss, "execution.stop_loss")?;
        let implied = implied_risk_reward(entry, target, stop)
            .ok_or_else(|| SynthesisError::Schema("entry_price equals stop_loss".to_string()))?;

        let mut metadata = RecommendationMetadata::new(self.config.model.clone());

        let direction = match raw.header.direction.as_deref().and_then(parse_direction) {
            Some(direction) => direction,
            None => {
                metadata.notes.push("direction inferred from target and entry".to_string());
                if target > entry {
                    TradeDirection::Long
                } else {
                    TradeDirection::Short
                }
            }
        };

        let risk_reward_ratio = match raw.execution.risk_reward_ratio.filter(|r| *r > 0.0) {
            Some(stated) => stated,
            None => implied,
        };
        if risk_reward_ratio < trade_type.min_risk_reward() {
            warn!(
                symbol = %candidate.symbol,
                ratio = risk_reward_ratio,
                minimum = trade_type.min_risk_reward(),
                "Synthesized card below minimum risk/reward"
            );
            metadata.risk_reward_below_minimum = true;
        }

        let risk_grade = match raw.header.risk_grade.as_deref().and_then(parse_risk_grade) {
            Some(grade) => grade,
            None => {
                metadata.notes.push("risk grade derived from risk signal".to_string());
                derive_risk_grade(candidate)
            }
        };
        let position_size = match raw.execution.position_size {
            Some(size) => size.clamp(0.0, 1.0),
            None => {
                metadata.notes.push("position size defaulted to grade minimum".to_string());
                risk_grade.position_size_range().0
            }
        };

        let defaults = TimingPlan::default();
        let raw_timing = raw.narrative.timing.unwrap_or_default();
        let timing = TimingPlan {
            urgency: raw_timing
                .urgency
                .as_deref()
                .and_then(parse_urgency)
                .unwrap_or(defaults.urgency),
            entry_window: raw_timing.entry_window.unwrap_or(defaults.entry_window),
        };

        for source in &composite.missing {
            metadata.notes.push(format!("no {} signal available", source));
        }

        Ok(Recommendation {
            symbol: candidate.symbol.clone(),
            header: TradeCardHeader {
                confidence,
                trade_type,
                timeframe: raw
                    .header
                    .timeframe
                    .unwrap_or_else(|| trade_type.default_timeframe().to_string()),
                direction,
                risk_grade,
            },
            narrative: TradeNarrative {
                setup,
                setup_type,
                catalyst,
                timing,
                confirmation: raw
                    .narrative
                    .confirmation
                    .unwrap_or_else(|| "wait for a close beyond the entry level".to_string()),
            },
            execution: ExecutionPlan {
                entry_price: entry,
                target_price: target,
                stop_loss: stop,
                position_size,
                risk_reward_ratio,
            },
            signal_composition: composite.clone(),
            counter_signals: raw.counter_signals.into_iter().take(10).collect(),
            metadata,
        })
    }
}

#[async_trait]
impl Synthesizer for GenerativeSynthesizer {
    async fn synthesize(
        &self,
        candidate: &Candidate,
        composite: &CompositeScore,
    ) -> Result<Recommendation, SynthesisError> {
        let prompt = self.build_prompt(candidate, composite);
        let schema = Self::output_schema();
        debug!(symbol = %candidate.symbol, prompt_chars = prompt.len(), "Requesting trade card");

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let payload = tokio::time::timeout(timeout, self.client.complete(&prompt, &schema))
            .await
            .map_err(|_| SynthesisError::Timeout(self.config.timeout_ms))??;

        self.parse_response(candidate, composite, payload)
    }
}

/// Grade implied by the candidate's (already inverted) risk signal
pub fn derive_risk_grade(candidate: &Candidate) -> RiskGrade {
    candidate
        .signal(SignalSource::Risk)
        .map(|signal| RiskGrade::from_inverted_score(signal.bounded_score()))
        .unwrap_or(RiskGrade::Medium)
}

fn missing(field: &str) -> SynthesisError {
    SynthesisError::Schema(format!("missing or invalid {}", field))
}

fn positive_price(value: Option<f64>, field: &str) -> Result<f64, SynthesisError> {
    value
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or_else(|| missing(field))
}

fn format_levels(levels: &[f64]) -> String {
    if levels.is_empty() {
        return "none".to_string();
    }
    levels
        .iter()
        .take(5)
        .map(|level| format!("{:.4}", level))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTradeCard {
    header: RawHeader,
    narrative: RawNarrative,
    execution: RawExecution,
    #[serde(deserialize_with = "lenient_strings")]
    counter_signals: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHeader {
    #[serde(deserialize_with = "lenient_f64")]
    confidence: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    trade_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    timeframe: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    direction: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    risk_grade: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNarrative {
    #[serde(deserialize_with = "lenient_string")]
    setup: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    setup_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    catalyst: Option<String>,
    #[serde(deserialize_with = "lenient_object")]
    timing: Option<RawTiming>,
    #[serde(deserialize_with = "lenient_string")]
    confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTiming {
    #[serde(deserialize_with = "lenient_string")]
    urgency: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    entry_window: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExecution {
    #[serde(deserialize_with = "lenient_f64")]
    entry_price: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    target_price: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    stop_loss: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    position_size: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    risk_reward_ratio: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::SignalComposer;
    use crate::config::ComposerConfig;
    use chrono::Utc;
    use common::{AnalyticalSignal, MarketContext, RiskGrade, SetupType, TradeType, Urgency};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        response: Result<Value, String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn ok(value: Value) -> Arc<Self> {
            Arc::new(Self { response: Ok(value), delay: None, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, _prompt: &str, _schema: &Value) -> Result<Value, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone().map_err(CollaboratorError::Unavailable)
        }
    }

    fn candidate() -> Candidate {
        Candidate::new(
            "AMD",
            MarketContext::new(150.0, Utc::now()).with_levels(vec![145.0], vec![165.0]),
        )
        .with_signal(
            AnalyticalSignal::new(SignalSource::Technical, 0.75)
                .with_subscore("rsi", 58.0)
                .with_narrative("Price reclaimed the 50-day moving average on rising volume"),
        )
        .with_signal(AnalyticalSignal::new(SignalSource::Risk, 0.6))
    }

    fn composite(candidate: &Candidate) -> CompositeScore {
        SignalComposer::new(&ComposerConfig::default()).compose(candidate)
    }

    fn full_card() -> Value {
        json!({
            "header": {"confidence": 0.72, "trade_type": "swing", "timeframe": "5-8 days", "direction": "long", "risk_grade": "medium"},
            "narrative": {
                "setup": "Breakout above the 150 consolidation range",
                "setup_type": "breakout",
                "catalyst": "Volume expansion through resistance",
                "timing": {"urgency": "today", "entry_window": "first hour"},
                "confirmation": "Close above 151"
            },
            "execution": {"entry_price": 150.0, "target_price": 165.0, "stop_loss": 144.0, "position_size": 0.03},
            "counter_signals": ["Sector breadth is narrow"]
        })
    }

    fn synthesizer(client: Arc<dyn CompletionClient>) -> GenerativeSynthesizer {
        GenerativeSynthesizer::new(client, SynthesisConfig::default())
    }

    #[tokio::test]
    async fn test_synthesizes_complete_card() {
        let input = candidate();
        let score = composite(&input);
        let card = synthesizer(ScriptedClient::ok(full_card()))
            .synthesize(&input, &score)
            .await
            .unwrap();

        assert_eq!(card.symbol, "AMD");
        assert_eq!(card.header.trade_type, TradeType::Swing);
        assert_eq!(card.header.direction, TradeDirection::Long);
        assert_eq!(card.narrative.setup_type, SetupType::Breakout);
        assert_eq!(card.narrative.timing.urgency, Urgency::Today);
        // 15 / 6 derived because the payload omitted the ratio
        assert!((card.execution.risk_reward_ratio - 2.5).abs() < 1e-12);
        assert!(!card.metadata.risk_reward_below_minimum);
        assert_eq!(card.metadata.model_used, "trade-card-synthesis");
        assert_eq!(card.signal_composition, score);
        assert!(!card.is_fallback());
    }

    #[test]
    fn test_clamps_and_defaults() {
        let input = candidate();
        let score = composite(&input);
        let payload = json!({
            "header": {"confidence": "1.8", "trade_type": "Day Trade"},
            "narrative": {"setup": "Gap fill", "setup_type": "pullback", "catalyst": "Dip into support"},
            "execution": {"entry_price": "$150", "target_price": 153.0, "stop_loss": 148.0}
        });

        let card = synthesizer(ScriptedClient::ok(Value::Null))
            .parse_response(&input, &score, payload)
            .unwrap();

        assert_eq!(card.header.confidence, 1.0);
        assert_eq!(card.header.direction, TradeDirection::Long);
        assert_eq!(card.header.timeframe, "1 day");
        // risk signal 0.6 maps to a medium grade
        assert_eq!(card.header.risk_grade, RiskGrade::Medium);
        assert_eq!(card.execution.position_size, RiskGrade::Medium.position_size_range().0);
        assert_eq!(card.narrative.timing, TimingPlan::default());
        assert!((card.execution.risk_reward_ratio - 1.5).abs() < 1e-12);
        assert!(!card.metadata.risk_reward_below_minimum);
    }

    #[test]
    fn test_malformed_timing_gets_defaults() {
        let input = candidate();
        let score = composite(&input);
        let synth = synthesizer(ScriptedClient::ok(Value::Null));

        for timing in [json!("today"), json!(null), json!(["immediate"])] {
            let mut payload = full_card();
            payload["narrative"]["timing"] = timing;
            let card = synth.parse_response(&input, &score, payload).unwrap();
            assert_eq!(card.narrative.timing, TimingPlan::default());
            assert_eq!(card.narrative.setup_type, SetupType::Breakout);
        }
    }

    #[test]
    fn test_low_ratio_is_recorded_not_fatal() {
        let input = candidate();
        let score = composite(&input);
        let mut payload = full_card();
        payload["execution"]["target_price"] = json!(154.0);

        let card = synthesizer(ScriptedClient::ok(Value::Null))
            .parse_response(&input, &score, payload)
            .unwrap();
        assert!(card.metadata.risk_reward_below_minimum);
        assert!((card.execution.risk_reward_ratio - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_ratio_is_kept() {
        let input = candidate();
        let score = composite(&input);
        let mut payload = full_card();
        payload["execution"]["risk_reward_ratio"] = json!(3.1);

        let card = synthesizer(ScriptedClient::ok(Value::Null))
            .parse_response(&input, &score, payload)
            .unwrap();
        assert_eq!(card.execution.risk_reward_ratio, 3.1);
    }

    #[test]
    fn test_schema_violations_are_refused() {
        let input = candidate();
        let score = composite(&input);
        let synth = synthesizer(ScriptedClient::ok(Value::Null));

        let mut no_stop = full_card();
        no_stop["execution"].as_object_mut().unwrap().remove("stop_loss");
        assert!(matches!(
            synth.parse_response(&input, &score, no_stop),
            Err(SynthesisError::Schema(_))
        ));

        let mut flat = full_card();
        flat["execution"]["stop_loss"] = json!(150.0);
        assert!(matches!(synth.parse_response(&input, &score, flat), Err(SynthesisError::Schema(_))));

        let mut negative = full_card();
        negative["execution"]["entry_price"] = json!(-3.0);
        assert!(matches!(synth.parse_response(&input, &score, negative), Err(SynthesisError::Schema(_))));

        assert!(matches!(
            synth.parse_response(&input, &score, json!("just some prose")),
            Err(SynthesisError::Schema(_))
        ));
    }

    #[tokio::test]
    async fn test_collaborator_error_becomes_synthesis_error() {
        let client = Arc::new(ScriptedClient {
            response: Err("rate limited".to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        });
        let input = candidate();
        let result = synthesizer(client.clone()).synthesize(&input, &composite(&input)).await;
        assert!(matches!(result, Err(SynthesisError::Call(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_synthesis_error() {
        let client = Arc::new(ScriptedClient {
            response: Ok(full_card()),
            delay: Some(Duration::from_secs(120)),
            calls: AtomicUsize::new(0),
        });
        let input = candidate();
        let result = synthesizer(client).synthesize(&input, &composite(&input)).await;
        assert!(matches!(result, Err(SynthesisError::Timeout(30_000))));
    }

    #[test]
    fn test_prompt_is_bounded() {
        let mut input = candidate();
        let long = "x".repeat(5_000);
        input.signals.insert(
            SignalSource::Sentiment,
            AnalyticalSignal::new(SignalSource::Sentiment, 0.6)
                .with_narrative(long.clone())
                .with_narrative(long.clone())
                .with_narrative(long.clone())
                .with_narrative(long),
        );
        let config = SynthesisConfig {
            max_prompt_chars: 1_000,
            ..SynthesisConfig::default()
        };
        let synth = GenerativeSynthesizer::new(ScriptedClient::ok(Value::Null), config);
        let prompt = synth.build_prompt(&input, &composite(&input));

        assert!(prompt.chars().count() <= 1_000);
        assert!(prompt.contains("AMD"));
        assert!(!prompt.contains(&"x".repeat(241)));

        let full = synthesizer(ScriptedClient::ok(Value::Null)).build_prompt(&input, &composite(&input));
        assert!(full.contains("anomaly: unavailable"));
        assert_eq!(full.matches(&"x".repeat(200)).count(), 3);
    }
}
