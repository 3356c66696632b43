use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ChatConfig;
use crate::embeddings::openai::is_retryable;
use crate::error::{GraphReaderError, Result};

use super::{DecisionOracle, DecisionRequest};

/// OpenAI-compatible chat-completions oracle using strict JSON-schema output.
///
/// Works against any endpoint that implements `response_format` with
/// `json_schema` (OpenAI, vLLM, Ollama's OpenAI layer).
pub struct ChatOracle {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    r#type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl ChatOracle {
    pub fn from_config(config: &ChatConfig, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraphReaderError::Oracle(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn build_request<'a>(&'a self, request: &'a DecisionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                r#type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.stage.as_str(),
                    strict: true,
                    schema: &request.schema,
                },
            },
        }
    }

    /// One HTTP round trip. `Err((retryable, error))` on failure.
    async fn send(&self, body: &ChatRequest<'_>) -> std::result::Result<String, (bool, GraphReaderError)> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                (
                    e.is_timeout() || e.is_connect(),
                    GraphReaderError::Oracle(format!("HTTP request failed: {}", e)),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err((
                is_retryable(status),
                GraphReaderError::Oracle(format!("Chat API error {}: {}", status, text)),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| (false, GraphReaderError::Oracle(format!("Failed to read response: {}", e))))
    }

    async fn complete(&self, request: &DecisionRequest) -> Result<serde_json::Value> {
        let body = self.build_request(request);
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        let raw = loop {
            match self.send(&body).await {
                Ok(raw) => break raw,
                Err((true, e)) if attempt < self.max_retries => {
                    log::warn!(
                        "{} oracle call failed, retry {}/{}: {}",
                        request.stage,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err((_, e)) => return Err(e),
            }
        };

        parse_completion(&raw)
    }
}

/// Extract the JSON object from a chat-completions response body.
fn parse_completion(raw: &str) -> Result<serde_json::Value> {
    let response: ChatResponse = serde_json::from_str(raw)
        .map_err(|e| GraphReaderError::Oracle(format!("Malformed chat response: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GraphReaderError::Oracle("Chat response has no choices".to_string()))?;

    if let Some(refusal) = choice.message.refusal {
        return Err(GraphReaderError::Oracle(format!("Model refused: {}", refusal)));
    }
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(GraphReaderError::Oracle(
            "Response truncated at max_tokens".to_string(),
        ));
    }

    let content = choice
        .message
        .content
        .ok_or_else(|| GraphReaderError::Oracle("Chat response has no content".to_string()))?;

    let value: serde_json::Value = serde_json::from_str(content.trim())
        .map_err(|e| GraphReaderError::Oracle(format!("Response content is not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(GraphReaderError::Oracle(format!(
            "Expected a JSON object, got: {}",
            value
        )));
    }
    Ok(value)
}

impl DecisionOracle for ChatOracle {
    fn decide<'a>(&'a self, request: &'a DecisionRequest) -> BoxFuture<'a, Result<serde_json::Value>> {
        Box::pin(self.complete(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{Decision, Stage, FactCheckDecision};
    use serde_json::json;

    fn chat_config() -> ChatConfig {
        ChatConfig {
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 1024,
            timeout_secs: 5,
            max_retries: 0,
            base_url: "http://localhost:8000/v1/".to_string(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let oracle = ChatOracle::from_config(&chat_config(), "key".to_string()).unwrap();
        let request = DecisionRequest {
            stage: Stage::AtomicFactCheck,
            system_prompt: "system".to_string(),
            user_prompt: "user".to_string(),
            schema: FactCheckDecision::schema(),
        };

        let body = serde_json::to_value(oracle.build_request(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "atomic_fact_check");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["properties"]["chosen_action"]["type"],
            "string"
        );
        assert_eq!(oracle.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn test_parse_completion_extracts_object() {
        let raw = json!({
            "choices": [{
                "message": {"content": "{\"rational_plan\": \"look up X\"}"},
                "finish_reason": "stop"
            }]
        })
        .to_string();
        let value = parse_completion(&raw).unwrap();
        assert_eq!(value["rational_plan"], "look up X");
    }

    #[test]
    fn test_parse_completion_failures() {
        let no_choices = json!({"choices": []}).to_string();
        assert!(parse_completion(&no_choices).is_err());

        let refused = json!({"choices": [{"message": {"content": null, "refusal": "no"}}]}).to_string();
        assert!(parse_completion(&refused).unwrap_err().to_string().contains("refused"));

        let truncated = json!({
            "choices": [{"message": {"content": "{\"rational"}, "finish_reason": "length"}]
        })
        .to_string();
        assert!(parse_completion(&truncated).unwrap_err().to_string().contains("truncated"));

        let not_json = json!({"choices": [{"message": {"content": "read_chunk([c1])"}}]}).to_string();
        assert!(matches!(parse_completion(&not_json), Err(GraphReaderError::Oracle(_))));

        let array = json!({"choices": [{"message": {"content": "[1, 2]"}}]}).to_string();
        assert!(parse_completion(&array).is_err());
    }
}
