//! Chat-completions client with function calling

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::debug;

use super::{Invocation, LlmError, ModelClient, ModelReply, ModelRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
        }
    }
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn build_headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|e| LlmError::Authentication(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn build_payload(&self, request: &ModelRequest) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": request.messages,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            payload["tools"] = Value::Array(tools);
            payload["tool_choice"] = json!("auto");
        }
        payload
    }

    fn parse_response(body: &Value) -> Result<ModelReply, LlmError> {
        let message = body
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message".into()))?;

        let content = message
            .get("content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let invocations = message
            .get("tool_calls")
            .and_then(|v| v.as_array())
            .map(|calls| {
                calls
                    .iter()
                    .map(Self::parse_tool_call)
                    .collect::<Result<Vec<_>, LlmError>>()
            })
            .transpose()?
            .unwrap_or_default();

        let usage = body
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(ModelReply {
            content,
            invocations,
            usage,
        })
    }

    fn parse_tool_call(call: &Value) -> Result<Invocation, LlmError> {
        let function = call
            .get("function")
            .ok_or_else(|| LlmError::InvalidResponse("tool call without function".into()))?;
        let name = function
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::InvalidResponse("tool call without name".into()))?;
        // Arguments normally arrive as a JSON string; keep them raw so a
        // malformed payload fails only its own invocation.
        let arguments = match function.get("arguments") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let mut invocation = Invocation::raw(name, arguments);
        if let Some(id) = call.get("id").and_then(|v| v.as_str()) {
            invocation.id = id.to_string();
        }
        Ok(invocation)
    }

    fn map_error(status: u16, body: &str) -> LlmError {
        match status {
            401 | 403 => LlmError::Authentication(body.to_string()),
            429 => LlmError::RateLimited,
            _ => LlmError::Api {
                status,
                message: body.to_string(),
            },
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, LlmError> {
        let headers = self.build_headers()?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let payload = self.build_payload(request);

        debug!(%url, model = %self.config.model, messages = request.messages.len(), "Sending completion request");
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::map_error(status.as_u16(), &text));
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Self::parse_response(&body)
    }
}
