// Lenient readers for collaborator JSON
// Generative collaborators are not schema-perfect: numbers arrive as strings,
// enum values arrive in free-form spelling. Everything here returns Option and
// leaves the accept/reject decision to the caller.

use common::{RiskGrade, SetupType, TradeDirection, TradeType, Urgency};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts a JSON number or a numeric string such as "$182.40" or "1,250"
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

/// Accepts a string or any scalar, rendered as a string
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => non_empty(&s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Accepts a list of strings, skipping anything else; a bare string becomes a one-item list
pub fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().and_then(non_empty))
            .collect(),
        Some(Value::String(s)) => non_empty(&s).into_iter().collect(),
        _ => Vec::new(),
    })
}

/// Accepts a JSON array as-is; null or any other shape becomes an empty list
pub fn lenient_values<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    })
}

/// Accepts a nested object; anything that is not an object, or does not fit `T`, becomes None
pub fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(object @ Value::Object(_)) => serde_json::from_value(object).ok(),
        _ => None,
    })
}

pub fn number_from_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace([' ', '-', '/'], "_")
}

pub fn parse_trade_type(raw: &str) -> Option<TradeType> {
    match normalize(raw).as_str() {
        "scalp" | "scalping" => Some(TradeType::Scalp),
        "day_trade" | "daytrade" | "day" | "intraday" => Some(TradeType::DayTrade),
        "swing" | "swing_trade" => Some(TradeType::Swing),
        "position" | "position_trade" | "long_term" => Some(TradeType::Position),
        _ => None,
    }
}

pub fn parse_direction(raw: &str) -> Option<TradeDirection> {
    match normalize(raw).as_str() {
        "long" | "buy" | "bullish" => Some(TradeDirection::Long),
        "short" | "sell" | "bearish" => Some(TradeDirection::Short),
        _ => None,
    }
}

pub fn parse_risk_grade(raw: &str) -> Option<RiskGrade> {
    match normalize(raw).as_str() {
        "low" => Some(RiskGrade::Low),
        "medium" | "moderate" => Some(RiskGrade::Medium),
        "high" => Some(RiskGrade::High),
        "very_high" | "veryhigh" | "extreme" => Some(RiskGrade::VeryHigh),
        _ => None,
    }
}

pub fn parse_setup_type(raw: &str) -> Option<SetupType> {
    match normalize(raw).as_str() {
        "breakout" => Some(SetupType::Breakout),
        "pullback" | "pull_back" | "retracement" => Some(SetupType::Pullback),
        "reversal" | "mean_reversion" => Some(SetupType::Reversal),
        "momentum" | "trend_following" => Some(SetupType::Momentum),
        "support_resistance" | "range" | "support" | "resistance" => Some(SetupType::SupportResistance),
        "earnings_play" | "earnings" => Some(SetupType::EarningsPlay),
        _ => None,
    }
}

pub fn parse_urgency(raw: &str) -> Option<Urgency> {
    match normalize(raw).as_str() {
        "immediate" | "now" | "urgent" => Some(Urgency::Immediate),
        "today" | "same_day" => Some(Urgency::Today),
        "this_week" | "week" | "days" => Some(Urgency::ThisWeek),
        "patient" | "wait" | "no_rush" => Some(Urgency::Patient),
        _ => None,
    }
}

/// Truncate on a char boundary, marking the cut
pub fn truncate_chars(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        return raw.to_string();
    }
    let mut truncated: String = raw.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
