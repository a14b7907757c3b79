//! Completion collaborator: provider abstraction over generative-model calls.
//! The engine only sees `CompletionClient`; concrete providers live here.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::completion::CompletionConfig;

pub const USER_AGENT: &str = "factfirst-news/0.1";
pub const ENV_COMPLETION_TEST_MODE: &str = "COMPLETION_TEST_MODE";

/// One prompt: the fixed instruction followed by the serialized article listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub instruction: String,
    pub listing: String,
}

impl CompletionRequest {
    pub fn prompt(&self) -> String {
        format!("{}\n\nArticles:\n{}", self.instruction, self.listing)
    }
}

/// What the model gave back. `Blocked` is a definite refusal, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Blocked { reason: String },
}

pub trait CompletionClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion>> + Send + 'a>>;
    fn provider_name(&self) -> &'static str;
}

pub type DynCompletionClient = Arc<dyn CompletionClient>;

/// Shared HTTP client for every outbound call of a run.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(60))
        .build()
        .context("build http client")
}

/// Factory: build a client according to config and environment variables.
///
/// * If `COMPLETION_TEST_MODE=mock`, returns the canned mock client.
/// * Else if `config.enabled == false`, returns a client that blocks everything.
/// * Else builds the configured provider.
pub fn build_client_from_config(config: &CompletionConfig) -> Result<DynCompletionClient> {
    if std::env::var(ENV_COMPLETION_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(MockCompletion::canned()));
    }

    if !config.enabled {
        return Ok(Arc::new(DisabledClient));
    }

    let client: DynCompletionClient = match config.provider.as_str() {
        "gemini" => Arc::new(GeminiClient::new(
            http_client()?,
            config.api_key.clone(),
            config.model.as_deref(),
            config.base_url.as_deref(),
        )),
        "openai" => Arc::new(OpenAiClient::new(
            http_client()?,
            config.api_key.clone(),
            config.model.as_deref(),
            config.base_url.as_deref(),
        )),
        "mock" => Arc::new(MockCompletion::canned()),
        other => bail!("unsupported completion provider: {other}"),
    };
    Ok(client)
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

/// Google Generative Language `generateContent`.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or("gemini-1.5-flash").to_string(),
            base_url: base_url
                .unwrap_or("https://generativelanguage.googleapis.com/v1beta")
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'a str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

/// Map a parsed Gemini response to a completion or a block.
pub fn interpret_gemini(resp: GeminiResponse) -> Completion {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Completion::Blocked {
            reason: format!("prompt blocked: {reason}"),
        };
    }
    let Some(first) = resp.candidates.into_iter().next() else {
        return Completion::Blocked {
            reason: "no candidates".to_string(),
        };
    };
    if first.finish_reason.as_deref() == Some("SAFETY") {
        return Completion::Blocked {
            reason: "finish reason SAFETY".to_string(),
        };
    }
    let text: String = first
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        Completion::Blocked {
            reason: "empty candidate text".to_string(),
        }
    } else {
        Completion::Text(text)
    }
}

impl CompletionClient for GeminiClient {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                bail!("gemini api key is empty");
            }
            let prompt = req.prompt();
            let body = GeminiRequest {
                contents: vec![GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart { text: &prompt }],
                }],
                generation_config: GeminiGenerationConfig { temperature: 0.2 },
            };
            let resp: GeminiResponse = self
                .http
                .post(format!(
                    "{}/models/{}:generateContent",
                    self.base_url, self.model
                ))
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await
                .context("gemini http post")?
                .error_for_status()
                .context("gemini http status")?
                .json()
                .await
                .context("gemini json body")?;
            Ok(interpret_gemini(resp))
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

/// OpenAI-compatible chat completions.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatReq<'a> {
    model: &'a str,
    messages: Vec<ChatMsg<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
pub struct ChatResp {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMsg>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMsg {
    content: Option<String>,
    refusal: Option<String>,
}

pub fn interpret_openai(resp: ChatResp) -> Completion {
    let Some(choice) = resp.choices.into_iter().next() else {
        return Completion::Blocked {
            reason: "no choices".to_string(),
        };
    };
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Completion::Blocked {
            reason: "content_filter".to_string(),
        };
    }
    let Some(msg) = choice.message else {
        return Completion::Blocked {
            reason: "no message".to_string(),
        };
    };
    if let Some(refusal) = msg.refusal.filter(|r| !r.trim().is_empty()) {
        return Completion::Blocked {
            reason: format!("refusal: {refusal}"),
        };
    }
    match msg.content {
        Some(text) if !text.trim().is_empty() => Completion::Text(text),
        _ => Completion::Blocked {
            reason: "empty message content".to_string(),
        },
    }
}

impl CompletionClient for OpenAiClient {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                bail!("openai api key is empty");
            }
            let body = ChatReq {
                model: &self.model,
                messages: vec![
                    ChatMsg {
                        role: "system",
                        content: &req.instruction,
                    },
                    ChatMsg {
                        role: "user",
                        content: &req.listing,
                    },
                ],
                temperature: 0.2,
            };
            let resp: ChatResp = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .context("openai http post")?
                .error_for_status()
                .context("openai http status")?
                .json()
                .await
                .context("openai json body")?;
            Ok(interpret_openai(resp))
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Disabled + mock
// ------------------------------------------------------------

/// Blocks every request; used when completions are disabled.
pub struct DisabledClient;

impl CompletionClient for DisabledClient {
    fn complete<'a>(
        &'a self,
        _req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion>> + Send + 'a>> {
        Box::pin(async {
            Ok(Completion::Blocked {
                reason: "completions disabled".to_string(),
            })
        })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Scripted client for tests and offline runs. Pops scripted replies in order,
/// then falls back to `fixed` (or an error when there is none).
pub struct MockCompletion {
    scripted: Mutex<VecDeque<Result<Completion, String>>>,
    fixed: Option<Completion>,
    seen: Mutex<Vec<CompletionRequest>>,
}

const CANNED_ANALYSIS: &str = r#"Here is the analysis:
{
  "factual_headline": "Mock story headline",
  "summary": "Deterministic mock analysis.",
  "core_facts": ["Mock fact one.", "Mock fact two."],
  "emoji_thumbnail": "📰",
  "sentiments": {
    "for": {"summary": "Supportive framing.", "examples": []},
    "neutral": {"summary": "Neutral framing.", "examples": []},
    "against": {"summary": "Critical framing.", "examples": []}
  },
  "narratives": [
    {"label": "Mock narrative", "summary": "Single mock narrative.", "sources": []}
  ],
  "source_articles": []
}"#;

impl MockCompletion {
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            fixed: Some(Completion::Text(text.into())),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A valid analysis for either breakdown mode.
    pub fn canned() -> Self {
        Self::fixed(CANNED_ANALYSIS)
    }

    pub fn scripted(replies: Vec<Result<Completion, String>>) -> Self {
        Self {
            scripted: Mutex::new(replies.into()),
            fixed: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn next_reply(&self, req: &CompletionRequest) -> Result<Completion> {
        if let Ok(mut g) = self.seen.lock() {
            g.push(req.clone());
        }
        let scripted = self.scripted.lock().ok().and_then(|mut q| q.pop_front());
        match (scripted, &self.fixed) {
            (Some(Ok(c)), _) => Ok(c),
            (Some(Err(e)), _) => bail!("mock transport error: {e}"),
            (None, Some(c)) => Ok(c.clone()),
            (None, None) => bail!("mock script exhausted"),
        }
    }
}

impl CompletionClient for MockCompletion {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion>> + Send + 'a>> {
        let out = self.next_reply(req);
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req() -> CompletionRequest {
        CompletionRequest {
            instruction: "do it".into(),
            listing: "[]".into(),
        }
    }

    #[test]
    fn gemini_prompt_feedback_block() {
        let r: GeminiResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        assert!(matches!(interpret_gemini(r), Completion::Blocked { .. }));
    }

    #[test]
    fn gemini_text_and_safety_finish() {
        let ok: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        assert_eq!(interpret_gemini(ok), Completion::Text("{\"a\":1}".into()));

        let unsafe_: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"x"}]},"finishReason":"SAFETY"}]}"#,
        )
        .unwrap();
        assert!(matches!(interpret_gemini(unsafe_), Completion::Blocked { .. }));
    }

    #[test]
    fn openai_filter_and_refusal_block() {
        let filtered: ChatResp = serde_json::from_str(
            r#"{"choices":[{"message":{"content":""},"finish_reason":"content_filter"}]}"#,
        )
        .unwrap();
        assert!(matches!(interpret_openai(filtered), Completion::Blocked { .. }));

        let refused: ChatResp = serde_json::from_str(
            r#"{"choices":[{"message":{"content":null,"refusal":"no"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert!(matches!(interpret_openai(refused), Completion::Blocked { .. }));

        let ok: ChatResp = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"{}"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert_eq!(interpret_openai(ok), Completion::Text("{}".into()));
    }

    #[tokio::test]
    async fn disabled_client_blocks() {
        let out = DisabledClient.complete(&req()).await.unwrap();
        assert!(matches!(out, Completion::Blocked { .. }));
    }

    #[tokio::test]
    async fn mock_script_then_exhaustion() {
        let m = MockCompletion::scripted(vec![
            Ok(Completion::Text("one".into())),
            Err("boom".into()),
        ]);
        assert_eq!(m.complete(&req()).await.unwrap(), Completion::Text("one".into()));
        assert!(m.complete(&req()).await.is_err());
        assert!(m.complete(&req()).await.is_err());
        assert_eq!(m.requests().len(), 3);
    }
}
