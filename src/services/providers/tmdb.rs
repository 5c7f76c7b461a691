/// TMDB catalog provider
///
/// Wraps the TMDB v3 REST API: search, discover-by-filter, genre taxonomy,
/// person search/credits, charts, and detail lookup with locale fallback.
/// Detail and taxonomy lookups are cached for the process lifetime.
use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::{
    cache::{Cache, CacheKey},
    cached,
    config::{Config, Tuning},
    error::{AppError, AppResult},
    models::{Genre, Movie, PersonCredits, PersonSearchResult},
    services::providers::{translate::TranslationClient, DiscoverQuery, MovieProvider},
};

/// Overviews shorter than this are considered missing and trigger the
/// base-language fallback fetch.
const MIN_OVERVIEW_LEN: usize = 40;

#[derive(Debug, Deserialize)]
struct TmdbPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenreList {
    #[serde(default)]
    genres: Vec<Genre>,
}

/// Detail endpoint shape: genres come as objects, not ids
#[derive(Debug, Deserialize)]
struct TmdbMovieDetails {
    id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    vote_average: Option<f64>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    genres: Vec<Genre>,
}

impl From<TmdbMovieDetails> for Movie {
    fn from(details: TmdbMovieDetails) -> Self {
        Movie {
            id: details.id,
            title: details.title,
            poster_path: details.poster_path,
            overview: details.overview,
            release_date: details.release_date,
            genre_ids: details.genres.iter().map(|g| g.id).collect(),
            vote_average: details.vote_average,
            popularity: details.popularity,
        }
    }
}

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    image_url: String,
    locale: String,
    base_locale: String,
    cache: Cache,
    translator: Option<TranslationClient>,
}

impl TmdbProvider {
    pub fn new(cache: Cache, config: &Config, tuning: &Tuning) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(tuning.provider_timeout_secs))
            .build()?;

        let translator = config
            .translate_api_url
            .as_ref()
            .map(|url| TranslationClient::new(cache.clone(), url.clone(), tuning));

        Ok(Self {
            http_client,
            api_key: config.tmdb_api_key.clone(),
            api_url: config.tmdb_api_url.clone(),
            image_url: config.tmdb_image_url.clone(),
            locale: config.locale.clone(),
            base_locale: config.base_locale.clone(),
            cache,
            translator,
        })
    }

    /// Target language for overview translation ("vi-VN" → "vi")
    fn target_lang(&self) -> &str {
        self.locale.split('-').next().unwrap_or(&self.locale)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn fetch_genre_list(&self, language: &str) -> AppResult<Vec<Genre>> {
        let list: TmdbGenreList = self
            .get_json("/genre/movie/list", &[("language", language.to_string())])
            .await?;
        Ok(list.genres)
    }

    async fn fetch_details(&self, id: u64, language: &str) -> AppResult<Movie> {
        let details: TmdbMovieDetails = self
            .get_json(
                &format!("/movie/{}", id),
                &[("language", language.to_string())],
            )
            .await?;
        Ok(details.into())
    }

    async fn chart(&self, path: &str, page: u32) -> AppResult<Vec<Movie>> {
        let page_data: TmdbPage<Movie> = self
            .get_json(
                path,
                &[
                    ("language", self.locale.clone()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        Ok(page_data.results)
    }

    fn overview_is_usable(overview: Option<&str>) -> bool {
        overview.is_some_and(|o| o.trim().len() >= MIN_OVERVIEW_LEN)
    }
}

#[async_trait::async_trait]
impl MovieProvider for TmdbProvider {
    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        let page: TmdbPage<Movie> = self
            .get_json(
                "/search/movie",
                &[
                    ("query", query.to_string()),
                    ("language", self.locale.clone()),
                ],
            )
            .await?;

        tracing::info!(
            query = %query,
            results = page.results.len(),
            provider = "tmdb",
            "Movie search completed"
        );

        Ok(page.results)
    }

    async fn discover(&self, query: &DiscoverQuery) -> AppResult<Vec<Movie>> {
        let mut params: Vec<(&str, String)> = vec![
            ("language", self.locale.clone()),
            ("sort_by", "popularity.desc".to_string()),
            ("page", query.page.to_string()),
        ];

        if !query.genre_ids.is_empty() {
            // Pipe join = OR within the genre facet
            let joined = query
                .genre_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("|");
            params.push(("with_genres", joined));
        }
        if let Some(person_id) = query.person_id {
            params.push(("with_people", person_id.to_string()));
        }
        if let Some(year) = query.year_min {
            params.push(("primary_release_date.gte", format!("{:04}-01-01", year)));
        }
        if let Some(year) = query.year_max {
            params.push(("primary_release_date.lte", format!("{:04}-12-31", year)));
        }
        if let Some(vote) = query.vote_min {
            params.push(("vote_average.gte", vote.to_string()));
        }
        if let Some(vote) = query.vote_max {
            params.push(("vote_average.lte", vote.to_string()));
        }

        let page: TmdbPage<Movie> = self.get_json("/discover/movie", &params).await?;

        tracing::debug!(
            genres = ?query.genre_ids,
            person = ?query.person_id,
            page = query.page,
            results = page.results.len(),
            provider = "tmdb",
            "Discovery page fetched"
        );

        Ok(page.results)
    }

    async fn movie_details(&self, id: u64) -> AppResult<Movie> {
        cached!(self.cache, CacheKey::MovieDetails(id), async move {
            let localized = self.fetch_details(id, &self.locale).await?;

            if Self::overview_is_usable(localized.overview.as_deref()) {
                return Ok(localized);
            }

            // Locale fallback: re-fetch in the base language and translate
            // the overview. A failed translation keeps the original text.
            let mut base = self.fetch_details(id, &self.base_locale).await?;
            if !localized.title.is_empty() {
                base.title = localized.title;
            }
            if let (Some(translator), Some(overview)) = (&self.translator, base.overview.clone()) {
                base.overview = Some(translator.translate(&overview, self.target_lang()).await);
            }

            tracing::debug!(
                movie_id = id,
                provider = "tmdb",
                "Detail lookup fell back to base language"
            );

            Ok::<_, AppError>(base)
        })
    }

    async fn genres(&self) -> AppResult<Vec<Genre>> {
        cached!(
            self.cache,
            CacheKey::GenreTaxonomy(self.locale.clone()),
            async move {
                let localized = self.fetch_genre_list(&self.locale).await?;
                let base = self.fetch_genre_list(&self.base_locale).await?;

                // Merge by id, preferring the localized name
                let mut merged: HashMap<u64, Genre> = HashMap::new();
                for genre in base {
                    merged.insert(genre.id, genre);
                }
                for genre in localized {
                    if !genre.name.trim().is_empty() {
                        merged.insert(genre.id, genre);
                    }
                }

                let mut genres: Vec<Genre> = merged.into_values().collect();
                genres.sort_by_key(|g| g.id);

                tracing::info!(
                    count = genres.len(),
                    locale = %self.locale,
                    provider = "tmdb",
                    "Genre taxonomy loaded"
                );

                Ok::<_, AppError>(genres)
            }
        )
    }

    async fn search_person(&self, name: &str) -> AppResult<Vec<PersonSearchResult>> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Person name cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache,
            CacheKey::PersonSearch(name.to_string()),
            async move {
                let page: TmdbPage<PersonSearchResult> = self
                    .get_json("/search/person", &[("query", name.to_string())])
                    .await?;

                tracing::info!(
                    name = %name,
                    results = page.results.len(),
                    provider = "tmdb",
                    "Person search completed"
                );

                Ok::<_, AppError>(page.results)
            }
        )
    }

    async fn person_credits(&self, person_id: u64) -> AppResult<PersonCredits> {
        let credits: PersonCredits = self
            .get_json(
                &format!("/person/{}/movie_credits", person_id),
                &[("language", self.locale.clone())],
            )
            .await?;

        tracing::debug!(
            person_id = person_id,
            cast = credits.cast.len(),
            crew = credits.crew.len(),
            provider = "tmdb",
            "Person credits fetched"
        );

        Ok(credits)
    }

    async fn top_rated(&self, page: u32) -> AppResult<Vec<Movie>> {
        self.chart("/movie/top_rated", page).await
    }

    async fn popular(&self, page: u32) -> AppResult<Vec<Movie>> {
        self.chart("/movie/popular", page).await
    }

    fn image_url(&self, path: &str, size: &str) -> String {
        format!("{}/{}{}", self.image_url, size, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_provider() -> TmdbProvider {
        TmdbProvider {
            http_client: reqwest::Client::new(),
            api_key: "test_key".to_string(),
            api_url: "http://test.local".to_string(),
            image_url: "https://image.tmdb.org/t/p".to_string(),
            locale: "vi-VN".to_string(),
            base_locale: "en-US".to_string(),
            cache: Cache::new(),
            translator: None,
        }
    }

    #[test]
    fn test_image_url_assembly() {
        let provider = create_test_provider();
        assert_eq!(
            provider.image_url("/poster.jpg", "w500"),
            "https://image.tmdb.org/t/p/w500/poster.jpg"
        );
    }

    #[test]
    fn test_target_lang_strips_region() {
        let provider = create_test_provider();
        assert_eq!(provider.target_lang(), "vi");
    }

    #[test]
    fn test_overview_usability() {
        assert!(!TmdbProvider::overview_is_usable(None));
        assert!(!TmdbProvider::overview_is_usable(Some("ngắn quá")));
        assert!(TmdbProvider::overview_is_usable(Some(
            "A thief who steals corporate secrets through dream-sharing technology."
        )));
    }

    #[tokio::test]
    async fn test_movie_details_served_from_cache() {
        let provider = create_test_provider();
        let movie = Movie {
            id: 27205,
            title: "Inception".to_string(),
            poster_path: Some("/inception.jpg".to_string()),
            overview: Some("A mind-bending heist thriller.".to_string()),
            release_date: Some("2010-07-16".to_string()),
            genre_ids: vec![28, 878],
            vote_average: Some(8.4),
            popularity: 90.5,
        };
        provider
            .cache
            .set(&CacheKey::MovieDetails(27205), &movie)
            .await;

        // Cache hit: no HTTP call is made against the unreachable endpoint
        let fetched = provider.movie_details(27205).await.unwrap();
        assert_eq!(fetched, movie);
    }

    #[tokio::test]
    async fn test_genres_served_from_cache() {
        let provider = create_test_provider();
        let taxonomy = vec![Genre { id: 28, name: "Hành Động".to_string() }];
        provider
            .cache
            .set(&CacheKey::GenreTaxonomy("vi-VN".to_string()), &taxonomy)
            .await;

        let genres = provider.genres().await.unwrap();
        assert_eq!(genres, taxonomy);
    }

    #[tokio::test]
    async fn test_person_search_served_from_cache() {
        let provider = create_test_provider();
        let results = vec![PersonSearchResult {
            id: 31,
            name: "Tom Hanks".to_string(),
            popularity: 60.0,
        }];
        provider
            .cache
            .set(&CacheKey::PersonSearch("Tom Hanks".to_string()), &results)
            .await;

        let fetched = provider.search_person("Tom Hanks").await.unwrap();
        assert_eq!(fetched, results);
    }

    #[test]
    fn test_movie_list_deserialization() {
        let json = r#"{
            "results": [{
                "id": 27205,
                "title": "Inception",
                "poster_path": "/inception.jpg",
                "release_date": "2010-07-16",
                "genre_ids": [28, 878],
                "vote_average": 8.4,
                "popularity": 90.5
            }]
        }"#;

        let page: TmdbPage<Movie> = serde_json::from_str(json).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].id, 27205);
        assert_eq!(page.results[0].genre_ids, vec![28, 878]);
        assert_eq!(page.results[0].vote_average, Some(8.4));
    }

    #[test]
    fn test_details_deserialization_converts_genre_objects() {
        let json = r#"{
            "id": 27205,
            "title": "Inception",
            "overview": "A mind-bending heist thriller.",
            "release_date": "2010-07-16",
            "vote_average": 8.4,
            "popularity": 90.5,
            "genres": [{"id": 28, "name": "Hành động"}, {"id": 878, "name": "Khoa học viễn tưởng"}]
        }"#;

        let details: TmdbMovieDetails = serde_json::from_str(json).unwrap();
        let movie: Movie = details.into();
        assert_eq!(movie.genre_ids, vec![28, 878]);
    }

    #[test]
    fn test_credits_deserialization_keeps_job() {
        let json = r#"{
            "cast": [{"id": 10, "title": "Acted In"}],
            "crew": [{"id": 20, "title": "Directed", "job": "Director"}]
        }"#;

        let credits: PersonCredits = serde_json::from_str(json).unwrap();
        assert_eq!(credits.cast[0].id, 10);
        assert_eq!(credits.crew[0].movie.id, 20);
        assert_eq!(credits.crew[0].job.as_deref(), Some("Director"));
    }
}
