use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Merged genre taxonomy, keyed by preferred locale
    GenreTaxonomy(String),
    /// Person search results by normalized query
    PersonSearch(String),
    /// Movie detail record by provider id
    MovieDetails(u64),
    /// Translated text by (target locale, source text)
    Translation(String, String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::GenreTaxonomy(locale) => write!(f, "genres:{}", locale),
            CacheKey::PersonSearch(query) => write!(f, "person:{}", query.to_lowercase()),
            CacheKey::MovieDetails(id) => write!(f, "movie:{}", id),
            CacheKey::Translation(target, text) => write!(f, "xlate:{}:{}", target, text),
        }
    }
}

/// Process-wide cache for cross-cutting lookups (genre taxonomy, person
/// searches, movie details, translations).
///
/// Explicitly constructed and injected so tests can substitute a fresh
/// instance; lifetime is the process lifetime, with no TTL or invalidation,
/// acceptable because the cached data changes rarely. Concurrent fills of the
/// same key are last-writer-wins.
#[derive(Clone, Default)]
pub struct Cache {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves a value from the cache by key
    ///
    /// Returns `None` when the key has never been populated. Values are stored
    /// serialized so heterogeneous types share one map.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let entries = self.entries.read().await;

        match entries.get(&format!("{}", key)) {
            Some(json) => {
                let data = serde_json::from_str(json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Stores a value in the cache
    ///
    /// Serialization failures are logged and swallowed; a missed cache write
    /// only costs a redundant fetch later.
    pub async fn set(&self, key: &CacheKey, value: &impl serde::Serialize) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let mut entries = self.entries.write().await;
        entries.insert(format!("{}", key), json);
    }
}

/// A macro to simplify get-or-populate caching logic.
///
/// Checks the cache for the given key and returns the cached value when
/// present. Otherwise executes the provided block, stores the computed value,
/// and returns it.
///
/// The expansion uses `?` on the cache lookup, so it must appear inside a
/// function returning [`AppResult`], and the block's error type must be
/// nameable (annotate its tail, e.g. `Ok::<_, AppError>(value)`).
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_from_cache(&$key).await? {
            Ok(cached)
        } else {
            let value = $block.await?;
            $cache.set(&$key, &value).await;
            Ok(value)
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_display_genres() {
        let key = CacheKey::GenreTaxonomy("vi-VN".to_string());
        assert_eq!(format!("{}", key), "genres:vi-VN");
    }

    #[test]
    fn test_cache_key_display_person_lowercase() {
        let key = CacheKey::PersonSearch("Tom Hanks".to_string());
        assert_eq!(format!("{}", key), "person:tom hanks");
    }

    #[test]
    fn test_cache_key_display_translation() {
        let key = CacheKey::Translation("vi".to_string(), "An overview".to_string());
        assert_eq!(format!("{}", key), "xlate:vi:An overview");
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = Cache::new();
        let key = CacheKey::MovieDetails(42);
        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, None);
    }

    #[tokio::test]
    async fn test_cache_set_then_get() {
        let cache = Cache::new();
        let key = CacheKey::PersonSearch("keanu".to_string());
        let value = vec!["item1".to_string(), "item2".to_string()];

        cache.set(&key, &value).await;

        let retrieved: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(retrieved, Some(value));
    }

    // The macro expands with `?`, so it only compiles inside an
    // AppResult-returning fn, mirroring how the provider methods use it.
    async fn populate(cache: &Cache, key: &CacheKey) -> AppResult<Vec<u64>> {
        cached!(cache, key, async { Ok::<_, AppError>(vec![28, 35]) })
    }

    async fn populate_failing(cache: &Cache, key: &CacheKey) -> AppResult<Vec<u64>> {
        cached!(cache, key, async {
            Err::<Vec<u64>, _>(AppError::Internal("block re-ran".to_string()))
        })
    }

    #[tokio::test]
    async fn test_cached_macro_populates_once() {
        let cache = Cache::new();
        let key = CacheKey::GenreTaxonomy("en-US".to_string());

        assert_eq!(populate(&cache, &key).await.unwrap(), vec![28, 35]);

        // Second call must hit the cache, not the block.
        assert_eq!(populate_failing(&cache, &key).await.unwrap(), vec![28, 35]);
    }
}
