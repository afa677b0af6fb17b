use crate::synthesis::CompletionClient;
use async_trait::async_trait;
use common::CollaboratorError;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Completion endpoint reached over HTTP
///
/// POSTs `{model, prompt, output_schema}` and accepts either the structured
/// object itself or an envelope of the form `{"output": {...}}`.
pub struct HttpCompletionClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    output_schema: &'a Value,
}

impl HttpCompletionClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, prompt: &str, output_schema: &Value) -> Result<Value, CollaboratorError> {
        let body = CompletionRequest {
            model: &self.model,
            prompt,
            output_schema,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(model = %self.model, endpoint = %self.endpoint, "Sending completion request");
        let response = request
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Decode(e.to_string()))?;
        Ok(unwrap_envelope(payload))
    }
}

/// Strip an `{"output": ...}` envelope; string outputs are parsed as JSON when possible
pub fn unwrap_envelope(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("output") => {
            match map.remove("output").unwrap_or(Value::Null) {
                Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
                other => other,
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope() {
        let inner = json!({"header": {"confidence": 0.5}});
        assert_eq!(unwrap_envelope(json!({"output": inner.clone()})), inner);
        assert_eq!(unwrap_envelope(inner.clone()), inner);
        assert_eq!(
            unwrap_envelope(json!({"output": "{\"coherence_score\": 0.8}"})),
            json!({"coherence_score": 0.8})
        );
        assert_eq!(unwrap_envelope(json!({"output": "prose"})), json!("prose"));
    }

    #[test]
    fn test_request_body_shape() {
        let schema = json!({"type": "object"});
        let body = CompletionRequest {
            model: "m",
            prompt: "p",
            output_schema: &schema,
        };
        let encoded = serde_json::to_value(&body).unwrap();
        assert_eq!(encoded, json!({"model": "m", "prompt": "p", "output_schema": {"type": "object"}}));
    }
}
