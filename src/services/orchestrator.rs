/// Turn orchestrator
///
/// Entry point for one conversational turn: routes the NLU result to an
/// intent handler and always produces a user-facing payload. Errors never
/// escape to the caller; a catastrophic failure becomes an apology message.
use std::sync::Arc;

use crate::{
    cache::Cache,
    config::{Config, Tuning},
    error::AppResult,
    models::{
        FacetSet, GenreRef, Intent, Movie, MovieSuggestion, NluResult, ResponsePayload, SlotValue,
    },
    services::{
        classify::{
            ClassifyStrategy, IntentCascade, KeywordMatcher, LocalClassifierClient,
            RemoteLlmClassifier,
        },
        facets::{self, resolve_facets},
        pool::CandidatePoolBuilder,
        providers::{tmdb::TmdbProvider, MovieProvider},
    },
};

/// Poster size used for suggestion cards
const POSTER_SIZE: &str = "w500";

/// Slot names carrying the seed title for by-name recommendations
const MOVIE_NAME_SLOTS: &[&str] = &["movie", "movie_name", "title"];

const MSG_SUGGESTION_HEADER: &str = "Đây là một số phim bạn có thể thích:";
const MSG_PERSONALIZED_HEADER: &str =
    "Dựa trên các phim được đánh giá cao và phổ biến, mình gợi ý:";
const MSG_CLARIFY: &str =
    "Bạn muốn xem phim thể loại gì, của diễn viên hay đạo diễn nào? Hãy cho mình biết thêm nhé!";
const MSG_CLARIFY_SEED: &str = "Bạn muốn tìm phim giống phim nào? Hãy cho mình biết tên phim nhé!";
const MSG_NO_RESULTS: &str = "Xin lỗi, mình không tìm thấy phim nào phù hợp.";
const MSG_ERROR: &str = "Xin lỗi, hệ thống đang gặp sự cố. Bạn thử lại sau nhé!";
const MSG_CAPABILITIES: &str = "Mình là trợ lý gợi ý phim. Bạn có thể hỏi mình gợi ý phim theo \
    thể loại, diễn viên, đạo diễn, năm phát hành hoặc điểm đánh giá. \
    Ví dụ: \"Gợi ý phim hành động của Tom Cruise điểm trên 7\".";

pub struct Recommender {
    provider: Arc<dyn MovieProvider>,
    cascade: IntentCascade,
    tuning: Tuning,
}

impl Recommender {
    pub fn new(provider: Arc<dyn MovieProvider>, cascade: IntentCascade, tuning: Tuning) -> Self {
        Self {
            provider,
            cascade,
            tuning,
        }
    }

    /// Wires the full production stack: TMDB provider over a process-wide
    /// cache, and the three-tier cascade (the remote LLM tier joins only when
    /// its API key is configured).
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let tuning = Tuning::default();
        let cache = Cache::new();
        let provider = TmdbProvider::new(cache, config, &tuning)?;

        let mut strategies: Vec<Box<dyn ClassifyStrategy>> = vec![Box::new(KeywordMatcher)];
        strategies.push(Box::new(LocalClassifierClient::new(
            config.classifier_url.clone(),
            tuning.local_confidence_threshold,
            tuning.classifier_timeout_secs,
        )?));
        if let Some(api_key) = &config.llm_api_key {
            strategies.push(Box::new(RemoteLlmClassifier::new(
                config.llm_api_url.clone(),
                api_key.clone(),
                config.llm_model.clone(),
                tuning.remote_confidence_threshold,
                tuning.llm_timeout_secs,
            )?));
        }

        Ok(Self::new(
            Arc::new(provider),
            IntentCascade::new(strategies),
            tuning,
        ))
    }

    /// Handles one turn. Never fails: whatever goes wrong downstream, the
    /// user gets a well-formed payload.
    pub async fn handle_turn(&self, nlu: &NluResult) -> ResponsePayload {
        match self.try_handle(nlu).await {
            Ok(payload) => payload,
            // Transient upstream failures are expected operational noise;
            // anything else at this boundary is a programming error.
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    query = %nlu.query_text,
                    intent = %nlu.intent_name,
                    error = %e,
                    "Turn degraded by an upstream failure"
                );
                ResponsePayload::message(MSG_ERROR)
            }
            Err(e) => {
                tracing::error!(
                    query = %nlu.query_text,
                    intent = %nlu.intent_name,
                    error = %e,
                    "Turn handling failed"
                );
                ResponsePayload::message(MSG_ERROR)
            }
        }
    }

    async fn try_handle(&self, nlu: &NluResult) -> AppResult<ResponsePayload> {
        let mut intent = Intent::from_name(&nlu.intent_name);

        // Unknown NLU intents go through the cascade before giving up
        if intent == Intent::Fallback {
            intent = self.cascade.resolve(&nlu.query_text).await.intent;
        }

        match intent {
            Intent::RecommendMovies => self.recommend_by_facets(nlu).await,
            Intent::RecommendByName => self.recommend_by_name(nlu).await,
            Intent::RecommendPersonalized => self.recommend_personalized().await,
            Intent::Fallback => Ok(ResponsePayload::message(MSG_CAPABILITIES)),
        }
    }

    /// Facet-driven recommendation: resolve slots, build the pool, answer
    /// with a suggestion list or an explanation of what could not be matched.
    async fn recommend_by_facets(&self, nlu: &NluResult) -> AppResult<ResponsePayload> {
        let facets = resolve_facets(self.provider.as_ref(), &nlu.parameters, &self.tuning).await?;

        if facets.is_empty() {
            if facets.unresolved_persons.is_empty() && facets.unmatched_genres.is_empty() {
                return Ok(ResponsePayload::message(MSG_CLARIFY));
            }
            return Ok(ResponsePayload::message(self.no_results_message(&facets)));
        }

        let movies = CandidatePoolBuilder::new(self.provider.as_ref(), &self.tuning)
            .build(&facets)
            .await?;

        if movies.is_empty() {
            return Ok(ResponsePayload::message(self.no_results_message(&facets)));
        }

        Ok(ResponsePayload::with_suggestions(
            MSG_SUGGESTION_HEADER,
            self.to_suggestions(movies),
        ))
    }

    /// "Movies like X": find the seed title, then pool from its genres. The
    /// seed itself never appears among its own suggestions.
    async fn recommend_by_name(&self, nlu: &NluResult) -> AppResult<ResponsePayload> {
        let Some(name) = self.seed_name(nlu) else {
            return Ok(ResponsePayload::message(MSG_CLARIFY_SEED));
        };

        let results = self.provider.search_movies(&name).await?;
        let Some(seed) = pick_seed(results, &name) else {
            return Ok(ResponsePayload::message(format!(
                "Mình không tìm thấy phim tên \"{}\". Bạn kiểm tra lại tên phim giúp mình nhé!",
                name
            )));
        };

        // List-endpoint records may lack genre ids; the detail record has them
        let seed = if seed.genre_ids.is_empty() {
            self.provider.movie_details(seed.id).await?
        } else {
            seed
        };

        let taxonomy = self.provider.genres().await.unwrap_or_default();
        let genres: Vec<GenreRef> = seed
            .genre_ids
            .iter()
            .map(|id| GenreRef {
                id: *id,
                canonical_name: taxonomy
                    .iter()
                    .find(|g| g.id == *id)
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| id.to_string()),
            })
            .collect();

        if genres.is_empty() {
            return Ok(ResponsePayload::message(MSG_NO_RESULTS));
        }

        let facets = FacetSet {
            genres,
            ..FacetSet::default()
        };
        let mut movies = CandidatePoolBuilder::new(self.provider.as_ref(), &self.tuning)
            .build(&facets)
            .await?;
        movies.retain(|m| m.id != seed.id);

        if movies.is_empty() {
            return Ok(ResponsePayload::message(MSG_NO_RESULTS));
        }

        Ok(ResponsePayload::with_suggestions(
            format!("Nếu bạn thích \"{}\", có thể bạn cũng sẽ thích:", seed.title),
            self.to_suggestions(movies),
        ))
    }

    /// Personalization stand-in: a blend of the top-rated and popular charts,
    /// honestly labeled as such.
    async fn recommend_personalized(&self) -> AppResult<ResponsePayload> {
        use crate::services::pool::CandidatePool;
        use rand::seq::SliceRandom;

        let mut pool = CandidatePool::new(self.tuning.pool_cap);
        for result in [
            self.provider.top_rated(1).await,
            self.provider.popular(1).await,
        ] {
            match result {
                Ok(movies) => {
                    for movie in movies {
                        pool.try_add(movie);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Chart fetch failed for personalized blend");
                }
            }
        }

        if pool.is_empty() {
            return Ok(ResponsePayload::message(MSG_NO_RESULTS));
        }

        let mut movies = pool.into_movies();
        movies.shuffle(&mut rand::thread_rng());

        Ok(ResponsePayload::with_suggestions(
            MSG_PERSONALIZED_HEADER,
            self.to_suggestions(movies),
        ))
    }

    fn seed_name(&self, nlu: &NluResult) -> Option<String> {
        MOVIE_NAME_SLOTS
            .iter()
            .filter_map(|key| nlu.parameters.get(*key))
            .flat_map(SlotValue::to_canonical_list)
            .next()
    }

    /// Explains an empty result, naming the persons and genres that matched
    /// nothing so the user can correct them.
    fn no_results_message(&self, facets: &FacetSet) -> String {
        let mut message = MSG_NO_RESULTS.to_string();
        if !facets.unresolved_persons.is_empty() {
            message.push_str(&format!(
                " Mình không tìm thấy thông tin về {}.",
                facets.unresolved_persons.join(", ")
            ));
        }
        if !facets.unmatched_genres.is_empty() {
            message.push_str(&format!(
                " Mình không nhận ra thể loại {}.",
                facets.unmatched_genres.join(", ")
            ));
        }
        message
    }

    fn to_suggestions(&self, movies: Vec<Movie>) -> Vec<MovieSuggestion> {
        movies
            .into_iter()
            .take(self.tuning.suggestion_limit)
            .map(|m| MovieSuggestion {
                id: m.id,
                title: m.title,
                poster: m
                    .poster_path
                    .as_deref()
                    .map(|p| self.provider.image_url(p, POSTER_SIZE)),
                rating: m.vote_average,
                release_date: m.release_date.filter(|d| !d.is_empty()),
            })
            .collect()
    }
}

/// Picks the seed movie from title-search results: exact normalized title
/// match first, otherwise the first (best-ranked) result.
fn pick_seed(results: Vec<Movie>, query: &str) -> Option<Movie> {
    let normalized_query = facets::normalize_text(query);
    if let Some(exact) = results
        .iter()
        .find(|m| facets::normalize_text(&m.title) == normalized_query)
    {
        return Some(exact.clone());
    }
    results.into_iter().next()
}
