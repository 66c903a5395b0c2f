use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::RunConfig;
use crate::error::{BackendError, RecastError};
use crate::prompts::PromptRequest;

/// The inference service seen as a single "prompt in, text out" operation.
/// Implementations report one attempt; retrying is the caller's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(&self, request: &PromptRequest) -> Result<String, BackendError>;

    fn model_name(&self) -> String;
}

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// One entry of the `models` listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// Name without the `models/` prefix, as accepted by `--model`.
    pub fn short_name(&self) -> &str {
        self.name.trim_start_matches("models/")
    }

    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

/// Map a non-success HTTP status and its body onto a failure class.
pub fn classify_status(status: u16, body: &str) -> BackendError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status.unwrap_or_default()),
        Err(_) => (body.trim().to_string(), String::new()),
    };
    let detail = if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, message)
    };
    let lowered = message.to_ascii_lowercase();

    if status == 429 || api_status == "RESOURCE_EXHAUSTED" || lowered.contains("quota") {
        return BackendError::RateLimited(detail);
    }
    if status == 404
        || api_status == "NOT_FOUND"
        || lowered.contains("is not found")
        || lowered.contains("not supported for generatecontent")
    {
        return BackendError::ModelUnavailable(detail);
    }
    if status == 408 || status >= 500 {
        return BackendError::Transient(detail);
    }
    BackendError::Rejected(detail)
}

/// REST client for the `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiBackend {
    pub fn new(config: &RunConfig) -> Result<Self, RecastError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let mut key_value = header::HeaderValue::from_str(&config.api_key)
            .map_err(|e| RecastError::FatalConfig(format!("Invalid API key format: {}", e)))?;
        key_value.set_sensitive(true);
        headers.insert("x-goog-api-key", key_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    /// Every model visible to the key, following page tokens.
    #[instrument(skip_all)]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, BackendError> {
        let url = format!("{}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| BackendError::Transient(format!("request failed: {}", e)))?;
            let status = response.status();
            if status != StatusCode::OK {
                let text = response.text().await.unwrap_or_default();
                return Err(classify_status(status.as_u16(), &text));
            }

            let page: ListModelsResponse = response
                .json()
                .await
                .map_err(|e| BackendError::Transient(format!("failed to decode model list: {}", e)))?;
            models.extend(page.models);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = models.len(), "Listed models");
        Ok(models)
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim_start_matches("models/");
        format!("{}/models/{}:generateContent", self.base_url, model)
    }

    fn build_body<'a>(&self, request: &'a PromptRequest) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: &request.system }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: &request.user }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                top_p: 0.95,
                top_k: 64,
                max_output_tokens: self.max_output_tokens,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .copied()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String, BackendError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(BackendError::Transient(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Transient("response contained no candidates".to_string()))?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(BackendError::Transient(
            "response blocked by safety filters".to_string(),
        ));
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(BackendError::Transient("response contained no text".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    #[instrument(skip_all, fields(model = %self.model, kind = ?request.kind))]
    async fn generate(&self, request: &PromptRequest) -> Result<String, BackendError> {
        let body = self.build_body(request);

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Transient(format!("request timed out: {}", e))
                } else {
                    BackendError::Transient(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Gemini returned an error status");
            return Err(classify_status(status.as_u16(), &text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("failed to decode response: {}", e)))?;

        extract_text(parsed)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
