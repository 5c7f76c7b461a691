/// Movie metadata provider abstraction
///
/// The pipeline issues many speculative calls against the catalog; every
/// method here can fail transiently (network, rate limits, upstream 5xx) and
/// callers are expected to treat a failed call as "contributes nothing"
/// rather than aborting the request.
use crate::{
    error::AppResult,
    models::{Genre, Movie, PersonCredits, PersonSearchResult},
};

pub mod tmdb;
pub mod translate;

/// A server-side discovery query: filters the catalog by one or more facets
/// and returns one popularity-sorted page.
///
/// Multiple genre ids combine with OR inside the genre facet; the facets
/// themselves combine with AND.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverQuery {
    pub genre_ids: Vec<u64>,
    pub person_id: Option<u64>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub vote_min: Option<f64>,
    pub vote_max: Option<f64>,
    pub page: u32,
}

impl Default for DiscoverQuery {
    fn default() -> Self {
        Self {
            genre_ids: Vec::new(),
            person_id: None,
            year_min: None,
            year_max: None,
            vote_min: None,
            vote_max: None,
            page: 1,
        }
    }
}

impl DiscoverQuery {
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }
}

/// Trait for movie metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieProvider: Send + Sync {
    /// Full-text title search
    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>>;

    /// Filtered, paginated, popularity-sorted discovery
    async fn discover(&self, query: &DiscoverQuery) -> AppResult<Vec<Movie>>;

    /// Detail lookup with locale fallback; the returned record has the most
    /// complete overview/rating data the provider can offer.
    async fn movie_details(&self, id: u64) -> AppResult<Movie>;

    /// Merged genre taxonomy (localized names preferred, base-language
    /// fallback), cached for the process lifetime.
    async fn genres(&self) -> AppResult<Vec<Genre>>;

    /// Person search by free-form name
    async fn search_person(&self, name: &str) -> AppResult<Vec<PersonSearchResult>>;

    /// A person's full credit list, split into cast and crew
    async fn person_credits(&self, person_id: u64) -> AppResult<PersonCredits>;

    /// Top-rated chart page, used as a pool safety net
    async fn top_rated(&self, page: u32) -> AppResult<Vec<Movie>>;

    /// Popularity chart page, used as a pool safety net
    async fn popular(&self, page: u32) -> AppResult<Vec<Movie>>;

    /// Full poster URL for an image path
    fn image_url(&self, path: &str, size: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_query_defaults_to_first_page() {
        let query = DiscoverQuery::default();
        assert_eq!(query.page, 1);
        assert!(query.genre_ids.is_empty());
    }

    #[test]
    fn test_discover_query_page_builder() {
        let query = DiscoverQuery::default().page(3);
        assert_eq!(query.page, 3);
    }
}
