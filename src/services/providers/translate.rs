/// Overview translation client
///
/// Translate-or-original semantics: any failure falls back to the untranslated
/// text, and a rate-limit response opens a cooldown window during which
/// translation is skipped entirely so the service is not hammered.
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{
    cache::{Cache, CacheKey},
    config::Tuning,
};

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Clone)]
pub struct TranslationClient {
    http_client: HttpClient,
    api_url: String,
    cache: Cache,
    cooldown: Duration,
    cooldown_until: Arc<RwLock<Option<Instant>>>,
}

impl TranslationClient {
    pub fn new(cache: Cache, api_url: String, tuning: &Tuning) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            cache,
            cooldown: Duration::from_secs(tuning.translate_cooldown_secs),
            cooldown_until: Arc::new(RwLock::new(None)),
        }
    }

    async fn in_cooldown(&self) -> bool {
        let until = self.cooldown_until.read().await;
        until.is_some_and(|t| Instant::now() < t)
    }

    async fn start_cooldown(&self) {
        let mut until = self.cooldown_until.write().await;
        *until = Some(Instant::now() + self.cooldown);
    }

    /// Translates `text` into `target`, returning the original text on any
    /// failure. Successful translations are cached by (target, text).
    pub async fn translate(&self, text: &str, target: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        if self.in_cooldown().await {
            tracing::debug!("Translation skipped during rate-limit cooldown");
            return text.to_string();
        }

        let key = CacheKey::Translation(target.to_string(), text.to_string());
        if let Ok(Some(cached)) = self.cache.get_from_cache::<String>(&key).await {
            return cached;
        }

        match self.call_api(text, target).await {
            Ok(translated) => {
                self.cache.set(&key, &translated).await;
                translated
            }
            Err(rate_limited) => {
                if rate_limited {
                    tracing::warn!(
                        cooldown_secs = self.cooldown.as_secs(),
                        "Translation rate limited, entering cooldown"
                    );
                    self.start_cooldown().await;
                }
                text.to_string()
            }
        }
    }

    /// Err(true) signals a rate limit, Err(false) any other failure
    async fn call_api(&self, text: &str, target: &str) -> Result<String, bool> {
        let response = self
            .http_client
            .post(&self.api_url)
            .json(&serde_json::json!({
                "q": text,
                "source": "auto",
                "target": target,
                "format": "text",
            }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Translation request failed");
                false
            })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(true);
        }
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Translation service error");
            return Err(false);
        }

        let body: TranslateResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Translation response parse failed");
            false
        })?;

        Ok(body.translated_text)
    }
}
