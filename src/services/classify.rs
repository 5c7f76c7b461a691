/// Intent classification cascade
///
/// Cheap deterministic matching first, then the local classifier service,
/// then the remote LLM, each tier consulted only when the previous one
/// declines. Transport failures demote to the next tier instead of failing
/// the turn.
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{Classification, ClassificationMethod, Intent},
    services::facets::normalize_text,
};

/// One tier of the cascade. `Ok(None)` means "I decline, ask the next tier";
/// an error is treated the same way by the cascade, with a warning.
#[async_trait]
pub trait ClassifyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, query: &str) -> AppResult<Option<Classification>>;
}

/// Maps a raw (intent name, confidence) pair from a classifier tier onto the
/// closed intent set, declining unknown intents and low-confidence answers.
fn accept(
    intent_name: &str,
    confidence: f64,
    threshold: f64,
    method: ClassificationMethod,
) -> Option<Classification> {
    let intent = Intent::from_name(intent_name);
    if intent == Intent::Fallback || confidence < threshold {
        return None;
    }
    Some(Classification {
        intent,
        confidence,
        method,
    })
}

// ============================================================================
// Tier 1: keyword patterns
// ============================================================================

fn by_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(giong|tuong tu|similar to|movies like|films like)\b").unwrap()
    })
}

fn personalized_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(ca nhan|so thich|theo gu|danh cho toi|for me|my taste|personalized)\b")
            .unwrap()
    })
}

fn recommend_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(goi y|de xuat|tim phim|xem phim|recommend|suggest|what (movie|film))\b")
            .unwrap()
    })
}

/// Deterministic first tier. Patterns run over accent-folded text, most
/// specific intent first, and answer with full confidence so later tiers are
/// never consulted on a hit.
pub struct KeywordMatcher;

#[async_trait]
impl ClassifyStrategy for KeywordMatcher {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn classify(&self, query: &str) -> AppResult<Option<Classification>> {
        let normalized = normalize_text(query);

        let intent = if by_name_re().is_match(&normalized) {
            Intent::RecommendByName
        } else if personalized_re().is_match(&normalized) {
            Intent::RecommendPersonalized
        } else if recommend_re().is_match(&normalized) {
            Intent::RecommendMovies
        } else {
            return Ok(None);
        };

        Ok(Some(Classification {
            intent,
            confidence: 1.0,
            method: ClassificationMethod::KeywordPattern,
        }))
    }
}

// ============================================================================
// Tier 2: local classifier service
// ============================================================================

#[derive(Debug, Deserialize)]
struct LocalClassifierResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    confidence: f64,
    /// Which model/path the service used, carried through to the log
    #[serde(default)]
    method: Option<String>,
}

pub struct LocalClassifierClient {
    http_client: reqwest::Client,
    api_url: String,
    threshold: f64,
}

impl LocalClassifierClient {
    pub fn new(api_url: String, threshold: f64, timeout_secs: u64) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            api_url,
            threshold,
        })
    }
}

#[async_trait]
impl ClassifyStrategy for LocalClassifierClient {
    fn name(&self) -> &'static str {
        "local_classifier"
    }

    async fn classify(&self, query: &str) -> AppResult<Option<Classification>> {
        let url = format!("{}/classify", self.api_url);
        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Classification(format!(
                "Local classifier returned status {}: {}",
                status, body
            )));
        }

        let parsed: LocalClassifierResponse = response.json().await?;
        if !parsed.ok {
            return Ok(None);
        }

        let Some(intent_name) = parsed.intent else {
            return Ok(None);
        };

        tracing::debug!(
            intent = %intent_name,
            confidence = parsed.confidence,
            service_method = parsed.method.as_deref().unwrap_or("unspecified"),
            "Local classifier answered"
        );

        Ok(accept(
            &intent_name,
            parsed.confidence,
            self.threshold,
            ClassificationMethod::LocalClassifier,
        ))
    }
}

// ============================================================================
// Tier 3: remote LLM classifier
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct LlmVerdict {
    intent: String,
    #[serde(default)]
    confidence: f64,
}

fn salvage_intent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""intent"\s*:\s*"([^"]+)""#).unwrap())
}

fn salvage_confidence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""confidence"\s*:\s*([0-9.]+)"#).unwrap())
}

/// Extracts the intent verdict from the model's reply, tolerating replies
/// that wrap the JSON in prose or fences.
fn parse_llm_content(content: &str) -> Option<(String, f64)> {
    if let Ok(verdict) = serde_json::from_str::<LlmVerdict>(content) {
        return Some((verdict.intent, verdict.confidence));
    }

    let intent = salvage_intent_re()
        .captures(content)?
        .get(1)?
        .as_str()
        .to_string();
    let confidence = salvage_confidence_re()
        .captures(content)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0);

    Some((intent, confidence))
}

pub struct RemoteLlmClassifier {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    threshold: f64,
}

impl RemoteLlmClassifier {
    pub fn new(
        api_url: String,
        api_key: String,
        model: String,
        threshold: f64,
        timeout_secs: u64,
    ) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http_client,
            api_url,
            api_key,
            model,
            threshold,
        })
    }

    fn system_prompt() -> String {
        let intents: Vec<&str> = Intent::KNOWN.iter().map(Intent::as_str).collect();
        format!(
            "You classify movie chatbot utterances (mostly Vietnamese) into exactly one \
             intent from this list: {}. Reply with a JSON object: \
             {{\"intent\": \"<name>\", \"confidence\": <0..1>}}. \
             Use \"fallback\" when none applies.",
            intents.join(", ")
        )
    }
}

#[async_trait]
impl ClassifyStrategy for RemoteLlmClassifier {
    fn name(&self) -> &'static str {
        "remote_llm"
    }

    async fn classify(&self, query: &str) -> AppResult<Option<Classification>> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": Self::system_prompt() },
                { "role": "user", "content": query },
            ],
            "temperature": 0,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "LLM classifier returned status {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let Some(content) = completion.choices.first().map(|c| c.message.content.as_str()) else {
            return Ok(None);
        };

        let Some((intent_name, confidence)) = parse_llm_content(content) else {
            tracing::warn!(content = %content, "LLM reply had no parsable verdict");
            return Ok(None);
        };

        Ok(accept(
            &intent_name,
            confidence,
            self.threshold,
            ClassificationMethod::RemoteLlm,
        ))
    }
}

// ============================================================================
// Cascade
// ============================================================================

pub struct IntentCascade {
    strategies: Vec<Box<dyn ClassifyStrategy>>,
}

impl IntentCascade {
    pub fn new(strategies: Vec<Box<dyn ClassifyStrategy>>) -> Self {
        Self { strategies }
    }

    /// Walks the tiers in order and always produces a classification. When
    /// every tier declines, a last-resort heuristic keeps the conversation
    /// moving rather than reporting an error.
    pub async fn resolve(&self, query: &str) -> Classification {
        for strategy in &self.strategies {
            match strategy.classify(query).await {
                Ok(Some(classification)) => {
                    tracing::info!(
                        query = %query,
                        intent = classification.intent.as_str(),
                        confidence = classification.confidence,
                        method = classification.method.as_str(),
                        "Intent classified"
                    );
                    return classification;
                }
                Ok(None) => {
                    tracing::debug!(strategy = strategy.name(), "Classifier tier declined");
                }
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), error = %e, "Classifier tier failed");
                }
            }
        }

        let normalized = normalize_text(query);
        let classification = if normalized.contains("phim") || normalized.contains("movie") {
            Classification {
                intent: Intent::RecommendMovies,
                confidence: 0.3,
                method: ClassificationMethod::Heuristic,
            }
        } else {
            Classification {
                intent: Intent::Fallback,
                confidence: 0.0,
                method: ClassificationMethod::Heuristic,
            }
        };

        tracing::info!(
            query = %query,
            intent = classification.intent.as_str(),
            method = classification.method.as_str(),
            "Intent fell through to heuristic"
        );
        classification
    }
}
