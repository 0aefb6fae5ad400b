//! Google Gemini provider using the `generateContent` REST API.
//!
//! Grounded requests bind the `google_search` tool and the response's
//! `groundingMetadata` is passed through as [`GroundingMetadata`].
//! Structured requests set `responseMimeType: application/json` with a
//! `responseSchema`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::core::GroundingMetadata;
use crate::error::AgentError;

/// Default Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini REST provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiProvider {
    /// Creates a provider from agent configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &AgentConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Builds the `generateContent` request body.
    fn build_request_body(request: &ChatRequest) -> Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(Self::message_to_content)
            .collect();

        let mut generation_config = json!({});
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }
        if let Some(schema) = &request.response_schema {
            generation_config["responseMimeType"] = json!("application/json");
            generation_config["responseSchema"] = to_gemini_schema(schema);
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
        }
        if request.grounding {
            body["tools"] = json!([{ "google_search": {} }]);
        }
        body
    }

    fn message_to_content(message: &ChatMessage) -> Value {
        let role = match message.role {
            Role::Assistant => "model",
            Role::User | Role::System => "user",
        };
        json!({ "role": role, "parts": [{ "text": message.content }] })
    }

    /// Extracts text, usage and grounding from the first candidate.
    fn parse_response(body: &Value) -> Result<ChatResponse, AgentError> {
        let candidate = body["candidates"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| AgentError::ApiRequest {
                message: "Gemini response has no candidates".to_string(),
                status: None,
            })?;

        let content = candidate["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let grounding = candidate
            .get("groundingMetadata")
            .filter(|v| !v.is_null())
            .and_then(|v| match serde_json::from_value::<GroundingMetadata>(v.clone()) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    debug!(error = %e, "ignoring malformed grounding metadata");
                    None
                }
            });

        let usage_metadata = &body["usageMetadata"];
        let count = |key: &str| {
            usage_metadata[key]
                .as_u64()
                .map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
        };

        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: count("promptTokenCount"),
                completion_tokens: count("candidatesTokenCount"),
                total_tokens: count("totalTokenCount"),
            },
            grounding,
            finish_reason: candidate["finishReason"].as_str().map(str::to_lowercase),
        })
    }

    /// Classifies a non-success HTTP response.
    fn map_http_error(status: StatusCode, body_text: &str) -> AgentError {
        if status == StatusCode::TOO_MANY_REQUESTS || body_text.contains("RESOURCE_EXHAUSTED") {
            AgentError::RateLimited {
                message: format!("HTTP {status} from Gemini API: {body_text}"),
            }
        } else {
            AgentError::ApiRequest {
                message: format!("HTTP {status} from Gemini API: {body_text}"),
                status: Some(status.as_u16()),
            }
        }
    }
}

/// Rewrites JSON-schema `type` names to Gemini's upper-case enum form.
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = match (k.as_str(), v) {
                        ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                        _ => to_gemini_schema(v),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = Self::build_request_body(request);
        debug!(
            model = request.model.as_str(),
            grounding = request.grounding,
            structured = request.response_schema.is_some(),
            "sending Gemini request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: format!("Request to Gemini API failed: {e}"),
                status: None,
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| AgentError::ApiRequest {
            message: format!("Failed to read Gemini response body: {e}"),
            status: Some(status.as_u16()),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let json: Value = serde_json::from_str(&body_text).map_err(|e| AgentError::ApiRequest {
            message: format!("Invalid JSON in Gemini response: {e}"),
            status: Some(status.as_u16()),
        })?;
        Self::parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::user_message;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> GeminiProvider {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .base_url(base_url)
            .build()
            .unwrap_or_else(|_| unreachable!());
        GeminiProvider::new(&config).unwrap_or_else(|_| unreachable!())
    }

    fn request(grounding: bool, schema: Option<Value>) -> ChatRequest {
        ChatRequest {
            model: "gemini-2.5-flash".to_string(),
            messages: vec![user_message("What is Rust?")],
            temperature: Some(0.0),
            max_tokens: None,
            response_schema: schema,
            grounding,
        }
    }

    #[test]
    fn test_body_binds_search_tool() {
        let body = GeminiProvider::build_request_body(&request(true, None));
        assert_eq!(body["tools"][0], json!({ "google_search": {} }));
        assert!(body["generationConfig"].get("responseSchema").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn test_body_sets_structured_output() {
        let schema = json!({
            "type": "object",
            "properties": { "query": { "type": "array", "items": { "type": "string" } } }
        });
        let body = GeminiProvider::build_request_body(&request(false, Some(schema)));
        let config = &body["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"]["type"], "OBJECT");
        assert_eq!(
            config["responseSchema"]["properties"]["query"]["items"]["type"],
            "STRING"
        );
        assert!(body.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_chat_parses_grounding_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(json!({ "tools": [{ "google_search": {} }] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Rust is fast." }] },
                    "finishReason": "STOP",
                    "groundingMetadata": {
                        "groundingChunks": [
                            { "web": { "uri": "https://a.example", "title": "a.example" } }
                        ],
                        "groundingSupports": [
                            { "segment": { "endIndex": 13, "text": "Rust is fast." },
                              "groundingChunkIndices": [0] }
                        ]
                    }
                }],
                "usageMetadata": {
                    "promptTokenCount": 5,
                    "candidatesTokenCount": 4,
                    "totalTokenCount": 9
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server.uri())
            .chat(&request(true, None))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(response.content, "Rust is fast.");
        assert_eq!(response.usage.total_tokens, 9);
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));

        let grounding = response.grounding.unwrap_or_default();
        assert_eq!(grounding.grounding_chunks[0].uri(), Some("https://a.example"));
        assert_eq!(grounding.grounding_supports[0].segment.start_index, None);
        assert_eq!(grounding.grounding_supports[0].segment.end_index, Some(13));
    }

    #[tokio::test]
    async fn test_chat_maps_429_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("RESOURCE_EXHAUSTED"))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).chat(&request(false, None)).await;
        let err = result.err().unwrap_or_else(|| unreachable!());
        assert!(matches!(err, AgentError::RateLimited { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_chat_maps_other_errors_to_api_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).chat(&request(false, None)).await;
        let err = result.err().unwrap_or_else(|| unreachable!());
        assert!(matches!(err, AgentError::ApiRequest { status: Some(400), .. }));
        assert!(!err.is_transient());
    }
}
