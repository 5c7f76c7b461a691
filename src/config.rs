use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Movie metadata provider API key
    pub tmdb_api_key: String,

    /// Movie metadata provider base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// Poster image base URL
    #[serde(default = "default_tmdb_image_url")]
    pub tmdb_image_url: String,

    /// Preferred catalog locale for titles, overviews and genre names
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Base-language locale used when the preferred locale has no data
    #[serde(default = "default_base_locale")]
    pub base_locale: String,

    /// Local intent classifier service URL
    #[serde(default = "default_classifier_url")]
    pub classifier_url: String,

    /// Remote LLM classifier (chat-completion style) endpoint
    #[serde(default = "default_llm_api_url")]
    pub llm_api_url: String,

    /// Remote LLM classifier API key; the remote tier is skipped when unset
    #[serde(default)]
    pub llm_api_key: Option<String>,

    /// Remote LLM model name
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Translation service URL; overview translation is skipped when unset
    #[serde(default)]
    pub translate_api_url: Option<String>,
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_url() -> String {
    "https://image.tmdb.org/t/p".to_string()
}

fn default_locale() -> String {
    "vi-VN".to_string()
}

fn default_base_locale() -> String {
    "en-US".to_string()
}

fn default_classifier_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_llm_api_url() -> String {
    "https://api.deepseek.com/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "deepseek-chat".to_string()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }
}

/// Pipeline tuning knobs.
///
/// The year-window and threshold values were tuned empirically in production;
/// they are carried as configuration rather than re-derived.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Maximum candidate pool size (bounds downstream detail-fetch cost)
    pub pool_cap: usize,
    /// Minimum pool size before the safety-net sources kick in
    pub min_pool: usize,
    /// Number of suggestions returned to the user per turn
    pub suggestion_limit: usize,
    /// Maximum number of detail-backfill calls per request
    pub detail_fetch_cap: usize,
    /// Parallelism bound for detail-backfill calls
    pub detail_concurrency: usize,
    /// Parallelism bound for person credit fetches
    pub credit_concurrency: usize,
    /// Maximum discovery pages fetched per source
    pub discover_page_limit: u32,
    /// Narrow year window for relative ("newer"/"older") constraints
    pub narrow_year_window: i32,
    /// Wide year window used when the narrow one yields too few results
    pub wide_year_window: i32,
    /// Offset emulating strict comparators against inclusive provider bounds
    pub rating_epsilon: f64,
    /// Acceptance threshold for the local classifier tier
    pub local_confidence_threshold: f64,
    /// Acceptance threshold for the remote LLM tier (higher bar)
    pub remote_confidence_threshold: f64,
    /// Timeout for metadata provider calls, in seconds
    pub provider_timeout_secs: u64,
    /// Timeout for the local classifier service, in seconds
    pub classifier_timeout_secs: u64,
    /// Timeout for the remote LLM classifier, in seconds
    pub llm_timeout_secs: u64,
    /// Cooldown after a translation rate-limit response, in seconds
    pub translate_cooldown_secs: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            pool_cap: 24,
            min_pool: 20,
            suggestion_limit: 8,
            detail_fetch_cap: 40,
            detail_concurrency: 8,
            credit_concurrency: 4,
            discover_page_limit: 5,
            narrow_year_window: 5,
            wide_year_window: 20,
            rating_epsilon: 0.01,
            local_confidence_threshold: 0.6,
            remote_confidence_threshold: 0.75,
            provider_timeout_secs: 6,
            classifier_timeout_secs: 2,
            llm_timeout_secs: 15,
            translate_cooldown_secs: 60,
        }
    }
}
