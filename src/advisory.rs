//! Advisory facade: turns a screened stock's feature bundle into a short
//! natural-language verdict via a chat-completion endpoint.
//!
//! The core treats this as an opaque function. Every failure mode — missing
//! API key, transport error, unparseable reply — degrades to the same fixed
//! neutral verdict and is never surfaced as an error to the caller.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AdvisoryConfig;
use crate::screener::ScreeningResult;

// ============================================================================
// Advice
// ============================================================================

/// Structured verdict for one stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    pub short_term: String,
    pub medium_term: String,
    pub suggestion: String,
    pub risk: String,
}

impl Advice {
    /// Fixed fallback used whenever the advisory call fails.
    pub fn neutral() -> Self {
        Self {
            short_term: "neutral".to_string(),
            medium_term: "neutral".to_string(),
            suggestion: "hold/watch".to_string(),
            risk: "market volatility".to_string(),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Chat-completion advisory client.
pub struct AdvisoryClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl AdvisoryClient {
    pub fn from_config(config: &AdvisoryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    /// Advise on one screened stock. Infallible by design: any failure
    /// yields the neutral verdict.
    pub async fn advise(&self, stock: &ScreeningResult) -> Advice {
        // no key configured: short-circuit without a network call
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("advisory api key not configured, using neutral verdict");
            return Advice::neutral();
        };

        match self.request(api_key, stock).await {
            Ok(advice) => advice,
            Err(e) => {
                warn!(symbol = stock.symbol.as_str(), error = %e, "advisory call failed, using neutral verdict");
                Advice::neutral()
            }
        }
    }

    async fn request(&self, api_key: &str, stock: &ScreeningResult) -> Result<Advice> {
        let payload = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are an A-share market analyst. Reply with a single JSON \
                              object holding exactly these string keys: short_term, \
                              medium_term, suggestion, risk. Keep each value under 30 words."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(stock),
                },
            ],
            temperature: 0.3,
            max_tokens: 300,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .context("advisory request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("advisory endpoint returned {}", response.status()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("advisory response not valid JSON")?;

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| anyhow!("advisory response had no choices"))?;

        parse_advice(content)
    }
}

/// Describe the stock's quote and active signals for the model.
fn build_prompt(stock: &ScreeningResult) -> String {
    let signals = stock.signals.active();
    let signal_text = if signals.is_empty() {
        "none".to_string()
    } else {
        signals.join(", ")
    };
    format!(
        "Stock {} ({}), last price {:.2}, change {:+.2}%. Active technical signals: {}.",
        stock.symbol, stock.display_name, stock.last_price, stock.change_percent, signal_text,
    )
}

/// Extract the advice object from the model's reply, tolerating code fences
/// and surrounding prose.
fn parse_advice(content: &str) -> Result<Advice> {
    let start = content
        .find('{')
        .ok_or_else(|| anyhow!("no JSON object in advisory reply"))?;
    let end = content
        .rfind('}')
        .ok_or_else(|| anyhow!("no JSON object in advisory reply"))?;
    if end < start {
        return Err(anyhow!("malformed advisory reply"));
    }
    serde_json::from_str(&content[start..=end]).context("advisory reply missing required keys")
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

// ============================================================================
// Tests
// ============================================================================
