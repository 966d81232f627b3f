use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;

use alchemy_contracts::generation::{ImageInput, PromptResult};
use alchemy_contracts::providers::ProviderId;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::error::{truncate_text, AlchemyError, Result, MAX_ERROR_BODY_CHARS};
use crate::instructions::PromptStyle;

pub const FALLBACK_PROMPT: &str = "Failed to generate prompt.";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const RESPONSES_USER_INSTRUCTION: &str =
    "Follow the system instructions and return the JSON object.";

#[derive(Clone)]
pub struct ProviderPromptRequest<'a> {
    pub instruction: &'a str,
    pub images: &'a [ImageInput],
    pub temperature: f64,
    pub api_key: &'a str,
    pub style: PromptStyle,
}

pub trait PromptProvider: Send + Sync {
    fn id(&self) -> ProviderId;
    fn generate(&self, request: &ProviderPromptRequest<'_>) -> Result<PromptResult>;

    fn label(&self) -> &str {
        self.id().label()
    }
}

#[derive(Default)]
pub struct PromptProviderRegistry {
    providers: BTreeMap<ProviderId, Box<dyn PromptProvider>>,
}

impl PromptProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: PromptProvider + 'static>(&mut self, provider: P) {
        self.providers.insert(provider.id(), Box::new(provider));
    }

    pub fn get(&self, id: ProviderId) -> Option<&dyn PromptProvider> {
        self.providers.get(&id).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers
            .keys()
            .map(|id| id.as_str().to_string())
            .collect()
    }
}

/// Where and with which model one provider is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub provider: ProviderId,
    pub api_base: String,
    pub model: String,
}

impl EndpointConfig {
    pub fn new(provider: ProviderId, api_base: &str, model: &str) -> Self {
        Self {
            provider,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            model: model.trim().to_string(),
        }
    }

    pub fn default_for(provider: ProviderId) -> Self {
        match provider {
            ProviderId::Gemini => Self::new(
                provider,
                "https://generativelanguage.googleapis.com/v1beta",
                "gemini-2.5-flash",
            ),
            ProviderId::OpenAi => Self::new(provider, "https://api.openai.com/v1", "gpt-4o-mini"),
            ProviderId::Grok => Self::new(provider, "https://api.x.ai/v1", "grok-2-vision-latest"),
        }
    }

    fn env_prefix(&self) -> &'static str {
        match self.provider {
            ProviderId::Gemini => "GEMINI",
            ProviderId::OpenAi => "OPENAI",
            ProviderId::Grok => "GROK",
        }
    }

    fn apply_env(mut self, env: &BTreeMap<String, String>) -> Self {
        let prefix = self.env_prefix();
        if let Some(base) = non_empty_value(env, &format!("{prefix}_API_BASE")) {
            self.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty_value(env, &format!("{prefix}_MODEL")) {
            self.model = model;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub endpoints: Vec<EndpointConfig>,
    pub timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            endpoints: ProviderId::ALL
                .into_iter()
                .map(EndpointConfig::default_for)
                .collect(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ProviderSettings {
    /// Defaults overridden by `{GEMINI,OPENAI,GROK}_API_BASE` and
    /// `{GEMINI,OPENAI,GROK}_MODEL` from an environment snapshot.
    pub fn from_env(env: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            endpoints: defaults
                .endpoints
                .into_iter()
                .map(|endpoint| endpoint.apply_env(env))
                .collect(),
            timeout: defaults.timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self, provider: ProviderId) -> EndpointConfig {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.provider == provider)
            .cloned()
            .unwrap_or_else(|| EndpointConfig::default_for(provider))
    }
}

pub fn default_provider_registry(settings: &ProviderSettings) -> PromptProviderRegistry {
    let mut registry = PromptProviderRegistry::new();
    registry.register(GeminiProvider::new(
        settings.endpoint(ProviderId::Gemini),
        settings.timeout,
    ));
    registry.register(ResponsesProvider::new(
        settings.endpoint(ProviderId::OpenAi),
        settings.timeout,
    ));
    registry.register(ResponsesProvider::new(
        settings.endpoint(ProviderId::Grok),
        settings.timeout,
    ));
    registry
}

/// Single-call `generateContent` protocol: images ride along as inline
/// binary parts and the reply is constrained to JSON.
pub struct GeminiProvider {
    endpoint: EndpointConfig,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(endpoint: EndpointConfig, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            http: HttpClient::new(),
        }
    }

    fn endpoint_url(&self) -> String {
        let trimmed = self.endpoint.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.endpoint.api_base, model_path)
    }

    fn build_payload(request: &ProviderPromptRequest<'_>) -> Value {
        let mut parts: Vec<Value> = request
            .images
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_or_default(),
                        "data": BASE64.encode(&image.bytes),
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": request.instruction }));
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "responseMimeType": "application/json",
            },
        })
    }

    fn extract_text(response: &Value) -> String {
        response
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

impl PromptProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        self.endpoint.provider
    }

    fn generate(&self, request: &ProviderPromptRequest<'_>) -> Result<PromptResult> {
        let label = self.label();
        let url = self.endpoint_url();
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", request.api_key)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(&Self::build_payload(request))
            .send()
            .map_err(|err| transport_error(label, &url, err))?;
        let payload = response_json_or_error(label, response)?;
        let text = Self::extract_text(&payload);
        if text.is_empty() {
            return Err(AlchemyError::response(
                label,
                format!("{label} response was empty."),
            ));
        }
        parse_prompt_reply(label, &text, request.style)
    }
}

/// Responses protocol with multi-part user content. OpenAI and Grok share it
/// and differ only in their `EndpointConfig`.
pub struct ResponsesProvider {
    endpoint: EndpointConfig,
    timeout: Duration,
    http: HttpClient,
}

impl ResponsesProvider {
    pub fn new(endpoint: EndpointConfig, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            http: HttpClient::new(),
        }
    }

    fn build_payload(&self, request: &ProviderPromptRequest<'_>) -> Value {
        let mut content: Vec<Value> = request
            .images
            .iter()
            .map(|image| {
                json!({
                    "type": "input_image",
                    "image_url": format!(
                        "data:{};base64,{}",
                        image.mime_or_default(),
                        BASE64.encode(&image.bytes)
                    ),
                    "detail": "high",
                })
            })
            .collect();
        content.push(json!({
            "type": "input_text",
            "text": RESPONSES_USER_INSTRUCTION,
        }));
        json!({
            "model": self.endpoint.model,
            "input": [
                {"role": "system", "content": request.instruction},
                {"role": "user", "content": content},
            ],
            "temperature": request.temperature,
            "store": false,
        })
    }
}

impl PromptProvider for ResponsesProvider {
    fn id(&self) -> ProviderId {
        self.endpoint.provider
    }

    fn generate(&self, request: &ProviderPromptRequest<'_>) -> Result<PromptResult> {
        let label = self.label();
        let url = format!("{}/responses", self.endpoint.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(request.api_key)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .json(&self.build_payload(request))
            .send()
            .map_err(|err| transport_error(label, &url, err))?;
        let payload = response_json_or_error(label, response)?;
        let text = extract_output_text(&payload);
        if text.is_empty() {
            return Err(AlchemyError::response(
                label,
                format!("No response from {label} model."),
            ));
        }
        parse_prompt_reply(label, &text, request.style)
    }
}

/// Reply text of a Responses payload: the top-level `output_text` when
/// present, else the first textual part under `output[].content[]`.
pub fn extract_output_text(response: &Value) -> String {
    if let Some(text) = response.get("output_text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return text.trim().to_string();
        }
    }

    let rows = response
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for row in rows {
        let content = row
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for chunk in content {
            let kind = chunk
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !matches!(kind, "output_text" | "text") {
                continue;
            }
            if let Some(text) = chunk.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    return text.trim().to_string();
                }
            }
        }
    }
    String::new()
}

/// Maps the model's JSON reply onto the canonical result.
pub fn parse_prompt_reply(provider: &str, text: &str, style: PromptStyle) -> Result<PromptResult> {
    let parsed: Value = serde_json::from_str(text.trim()).map_err(|err| {
        AlchemyError::response(
            provider,
            format!(
                "reply was not valid JSON ({err}): {}",
                truncate_text(text.trim(), MAX_ERROR_BODY_CHARS)
            ),
        )
    })?;
    let Some(fields) = parsed.as_object() else {
        return Err(AlchemyError::response(
            provider,
            format!(
                "reply was not a JSON object: {}",
                truncate_text(text.trim(), MAX_ERROR_BODY_CHARS)
            ),
        ));
    };
    let prompt = fields
        .get("prompt")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(FALLBACK_PROMPT)
        .to_string();
    let negative_prompt =
        style.enforce_negative_prompt(fields.get("negativePrompt").and_then(Value::as_str));
    Ok(PromptResult {
        prompt,
        negative_prompt,
    })
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        AlchemyError::transport(
            provider,
            Some(code),
            format!("response body read failed: {}", error_chain_text(&err)),
            "",
        )
    })?;
    if !status.is_success() {
        return Err(AlchemyError::transport(
            provider,
            Some(code),
            "request failed",
            &body,
        ));
    }
    serde_json::from_str(&body).map_err(|err| {
        AlchemyError::response(
            provider,
            format!(
                "returned invalid JSON payload ({err}): {}",
                truncate_text(body.trim(), MAX_ERROR_BODY_CHARS)
            ),
        )
    })
}

fn transport_error(provider: &str, url: &str, err: reqwest::Error) -> AlchemyError {
    let status = err.status().map(|status| status.as_u16());
    let kind = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    AlchemyError::transport(
        provider,
        status,
        // The url is named once here; the cause chain is rendered without it.
        format!("{kind} ({url}): {}", error_chain_text(&err.without_url())),
        "",
    )
}

fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    truncate_text(&parts.join(" | caused by: "), MAX_ERROR_BODY_CHARS)
}

fn non_empty_value(env: &BTreeMap<String, String>, key: &str) -> Option<String> {
    env.get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
