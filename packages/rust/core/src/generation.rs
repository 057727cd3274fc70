//! Chat-completion client for the remote generation service.
//!
//! Each request is a single system/user prompt pair asking for a JSON object
//! response. Failed attempts are retried immediately up to the configured
//! limit; exhaustion is reported as [`GenerationOutcome::Exhausted`] rather
//! than as a fake successful answer.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use profilesynth_shared::{GenerationSettings, ProfileSynthError, Result};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("ProfileSynth/", env!("CARGO_PKG_VERSION"));

/// System prompt used for Q&A synthesis.
const QA_SYSTEM_PROMPT: &str = "You are an expert in creating training data. Your job is to \
generate a list of question-and-answer pairs based ONLY on the provided text.";

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// A system/user prompt pair, built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_prompt: String,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
        }
    }

    /// Prompt asking for exactly `count` interview-style Q&A pairs about `context`.
    pub fn for_profile(context: &str, count: u32) -> Self {
        let user_prompt = format!(
            r#"Here is a student's profile text:
---
{context}
---
Based ONLY on the text above, act as an interviewer and generate a JSON object with a single key "qa_pairs".
The value of "qa_pairs" should be a list containing exactly {count} unique JSON objects.
Each object must have two keys:
1. "question": A question phrased in the SECOND PERSON, as if you are speaking directly to the student (e.g., "What is YOUR student ID?"). Focus on less obvious or more specific details from the profile.
2. "answer": The precise, factual answer to that question, taken directly from the text."#
        );
        Self::new(QA_SYSTEM_PROMPT, user_prompt)
    }
}

/// What a call to [`GenerationClient::execute`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Message content of the first choice, trimmed.
    Completed { text: String, attempts: u32 },
    /// Every attempt failed.
    Exhausted { attempts: u32, last_error: String },
}

impl GenerationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Collapse into response text, rendering exhaustion as an in-band
    /// `{"error": "..."}` JSON object.
    ///
    /// The result is always well-formed JSON when exhausted, but a reader
    /// can only tell it apart from a real answer by the `error` key. Match on
    /// the outcome instead wherever possible.
    pub fn into_payload(self) -> String {
        match self {
            Self::Completed { text, .. } => text,
            Self::Exhausted { last_error, .. } => serde_json::json!({
                "error": format!("Failed to connect to AI service: {last_error}")
            })
            .to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client bound to one endpoint, key, and model.
pub struct GenerationClient {
    client: Client,
    settings: GenerationSettings,
}

impl GenerationClient {
    /// Build a client whose per-attempt timeout comes from `settings`.
    pub fn new(settings: GenerationSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProfileSynthError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Send `request`, retrying immediately on any failure.
    #[instrument(skip_all, fields(model = %self.settings.model, max_attempts = self.settings.max_attempts))]
    pub async fn execute(&self, request: &GenerationRequest) -> GenerationOutcome {
        let body = ChatCompletionRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            debug!(attempt, "sending generation request");
            match self.attempt(&body).await {
                Ok(text) => {
                    info!(attempt, chars = text.len(), "generation response received");
                    return GenerationOutcome::Completed {
                        text,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "generation attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        error!(attempts = max_attempts, error = %last_error, "generation retries exhausted");
        GenerationOutcome::Exhausted {
            attempts: max_attempts,
            last_error,
        }
    }

    /// One POST; any transport, status, or body-shape problem is an error.
    async fn attempt(&self, body: &ChatCompletionRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProfileSynthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(ProfileSynthError::Transport(format!("HTTP {status}: {snippet}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProfileSynthError::Transport(format!("malformed response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| ProfileSynthError::Transport("no choices in response".into()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
