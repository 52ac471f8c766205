use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RaterError;
use crate::settings::RaterSettings;

pub const RUBRIC: &str = "\
You are an expert financial analyst.
Your task is to assign a Digital Finance Adoption Score to company report text.
Use the following guidelines to score between 0.0 (no adoption) and 1.0 (heavy adoption).

Scoring anchors:
- 0.0 = No mention of digital finance
- 0.2 = Vague or aspirational
- 0.4 = General mentions without detail
- 0.6 = Moderate adoption with examples
- 0.8 = Strong adoption with multiple concrete initiatives
- 1.0 = Heavy emphasis with measurable outcomes

Keyword weighting:
- Strong (0.6-1.0): fintech, e-wallet, mobile wallet, QR payments, blockchain, digital-only bank, open banking
- Moderate (0.3-0.6): online banking, mobile app, internet banking, digital payments, contactless payments
- Weak (0.1-0.3): digital transformation, innovation, technology adoption (not finance-specific)

Context adjustments:
+0.2 if numbers/metrics included
-0.2 if purely marketing fluff
Return ONLY a numeric score between 0.0 and 1.0.
";

/// Anything that can put a 0..=1 adoption score on a chunk of text.
pub trait ChunkRater {
    fn rate(&self, text: &str) -> Result<f64, RaterError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsRater {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    max_retries: u32,
    backoff_ms: u64,
}

impl ChatCompletionsRater {
    pub fn from_settings(settings: &RaterSettings) -> Result<Self, RaterError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(RaterError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(ChatCompletionsRater {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key,
            max_tokens: settings.max_tokens,
            max_retries: settings.max_retries,
            backoff_ms: settings.backoff_ms,
        })
    }

    fn rate_once(&self, text: &str) -> Result<f64, RaterError> {
        let user = format!("Text: {}", text);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: RUBRIC,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RaterError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: ChatResponse = response.json()?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        parse_score(&content)
    }
}

impl ChunkRater for ChatCompletionsRater {
    fn rate(&self, text: &str) -> Result<f64, RaterError> {
        for attempt in 0..=self.max_retries {
            match self.rate_once(text) {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = Duration::from_millis(self.backoff_ms * 2u64.pow(attempt));
                    warn!(
                        "Rater call failed ({}), attempt {}/{}, backing off {:.1}s",
                        e,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    thread::sleep(backoff);
                }
                Err(RaterError::Status { status: 429, .. }) => {
                    return Err(RaterError::RateLimited {
                        attempts: attempt + 1,
                    })
                }
                other => return other,
            }
        }
        Err(RaterError::RateLimited {
            attempts: self.max_retries + 1,
        })
    }
}

/// The reply must be a bare number in [0, 1].
pub fn parse_score(content: &str) -> Result<f64, RaterError> {
    let trimmed = content.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && (0.0..=1.0).contains(&v) => Ok(v),
        _ => Err(RaterError::Unparseable(trimmed.to_string())),
    }
}

/// Rate a chunk, mapping every failure to "score unavailable".
pub fn rate_or_none(rater: &dyn ChunkRater, text: &str) -> Option<f64> {
    match rater.rate(text) {
        Ok(score) => Some(score),
        Err(e) => {
            warn!(error = %e, "score unavailable");
            None
        }
    }
}
