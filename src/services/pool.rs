/// Candidate pool builder
///
/// Given resolved facets, produces a deduplicated, role-aware candidate set:
/// AND-matching across facets, progressive widening when data is sparse, lazy
/// detail backfill, and a final shuffle for presentation diversity. Every
/// provider call here is speculative; a failed call is logged and simply
/// contributes nothing.
use std::collections::HashMap;

use chrono::Datelike;
use futures::{stream, StreamExt};
use rand::seq::SliceRandom;

use crate::{
    config::Tuning,
    error::AppResult,
    models::{FacetSet, Movie},
    services::providers::{DiscoverQuery, MovieProvider},
};

/// Capacity-guarded accumulator shared by every data source.
///
/// `try_add` is the single stopping guard: duplicates always merge (most
/// complete record wins), new candidates are dropped once the cap is reached.
pub struct CandidatePool {
    movies: HashMap<u64, Movie>,
    cap: usize,
}

impl CandidatePool {
    pub fn new(cap: usize) -> Self {
        Self {
            movies: HashMap::new(),
            cap,
        }
    }

    /// Adds or merges a candidate. Returns false when the candidate was new
    /// but the pool is already at capacity.
    pub fn try_add(&mut self, movie: Movie) -> bool {
        if let Some(existing) = self.movies.get_mut(&movie.id) {
            existing.merge(movie);
            return true;
        }
        if self.is_full() {
            return false;
        }
        self.movies.insert(movie.id, movie);
        true
    }

    /// Merges detail data into an existing candidate; unknown ids are ignored
    /// so a late detail fetch can never grow the pool.
    pub fn merge_details(&mut self, movie: Movie) {
        if let Some(existing) = self.movies.get_mut(&movie.id) {
            existing.merge(movie);
        }
    }

    pub fn is_full(&self) -> bool {
        self.movies.len() >= self.cap
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn into_movies(self) -> Vec<Movie> {
        self.movies.into_values().collect()
    }

    fn ids_missing_fields(&self) -> Vec<u64> {
        self.movies
            .values()
            .filter(|m| m.vote_average.is_none() || m.release_year().is_none())
            .map(|m| m.id)
            .collect()
    }
}

pub struct CandidatePoolBuilder<'a> {
    provider: &'a dyn MovieProvider,
    tuning: &'a Tuning,
}

impl<'a> CandidatePoolBuilder<'a> {
    pub fn new(provider: &'a dyn MovieProvider, tuning: &'a Tuning) -> Self {
        Self { provider, tuning }
    }

    /// Runs the full staged algorithm and returns the shuffled, capped pool.
    /// The caller slices the final suggestion list off the front.
    pub async fn build(&self, facets: &FacetSet) -> AppResult<Vec<Movie>> {
        let mut pool = CandidatePool::new(self.tuning.pool_cap);

        if !facets.persons.is_empty() {
            self.seed_from_credits(&mut pool, facets);
            if pool.is_empty() && !facets.genres.is_empty() {
                self.discover_person_genre_pairs(&mut pool, facets).await;
            }
        } else {
            self.discover_combined(&mut pool, facets).await;
        }

        if pool.len() < self.tuning.min_pool {
            self.augment_from_charts(&mut pool, facets).await;
        }

        self.backfill_details(&mut pool).await;

        let current_year = chrono::Utc::now().year();
        let mut survivors = self.apply_filters(pool.into_movies(), facets, current_year);

        survivors.shuffle(&mut rand::thread_rng());
        survivors.truncate(self.tuning.pool_cap);

        tracing::info!(
            candidates = survivors.len(),
            persons = facets.persons.len(),
            genres = facets.genres.len(),
            "Candidate pool built"
        );

        Ok(survivors)
    }

    /// Stage 1+2: union every person's credit list, then keep only movies
    /// satisfying every person's role-aware constraint (co-starring /
    /// co-directing semantics).
    fn seed_from_credits(&self, pool: &mut CandidatePool, facets: &FacetSet) {
        let mut union: HashMap<u64, Movie> = HashMap::new();
        for person in &facets.persons {
            for movie in &person.credits {
                union
                    .entry(movie.id)
                    .and_modify(|existing| existing.merge(movie.clone()))
                    .or_insert_with(|| movie.clone());
            }
        }

        let before = union.len();
        for movie in union.into_values() {
            if facets.persons.iter().all(|p| p.matches(movie.id)) {
                pool.try_add(movie);
            }
        }

        tracing::debug!(
            credited = before,
            surviving = pool.len(),
            "Applied per-person AND constraint"
        );
    }

    /// Stage 2 fallback: when the credit-list intersection is empty, let the
    /// provider discover per (person, genre) pair, since its credit data can
    /// be more complete than the credit endpoint's.
    async fn discover_person_genre_pairs(&self, pool: &mut CandidatePool, facets: &FacetSet) {
        'outer: for person in &facets.persons {
            for genre in &facets.genres {
                if pool.is_full() {
                    break 'outer;
                }
                let query = DiscoverQuery {
                    genre_ids: vec![genre.id],
                    person_id: Some(person.id),
                    ..DiscoverQuery::default()
                };
                match self.provider.discover(&query).await {
                    Ok(movies) => {
                        for movie in movies {
                            pool.try_add(movie);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            person = %person.canonical_name,
                            genre = %genre.canonical_name,
                            error = %e,
                            "Person-genre discovery failed, skipping pair"
                        );
                    }
                }
            }
        }
    }

    /// Stage 3: one combined discovery query per page over whichever facets
    /// are present, paged until the cap or the page limit.
    async fn discover_combined(&self, pool: &mut CandidatePool, facets: &FacetSet) {
        let base = self.discover_query(facets);

        for page in 1..=self.tuning.discover_page_limit {
            if pool.is_full() {
                break;
            }
            match self.provider.discover(&base.clone().page(page)).await {
                Ok(movies) => {
                    if movies.is_empty() {
                        break;
                    }
                    for movie in movies {
                        pool.try_add(movie);
                    }
                }
                Err(e) => {
                    tracing::warn!(page = page, error = %e, "Discovery page failed, stopping pagination");
                    break;
                }
            }
        }
    }

    /// Stage 4: below the minimum pool size, pull from the top-rated and
    /// popular charts (filtered against the resolved person/genre constraints
    /// before admission), then extend discovery a further bounded page run.
    async fn augment_from_charts(&self, pool: &mut CandidatePool, facets: &FacetSet) {
        let sources = [
            ("top_rated", self.provider.top_rated(1).await),
            ("popular", self.provider.popular(1).await),
        ];

        for (name, result) in sources {
            if pool.is_full() {
                break;
            }
            match result {
                Ok(movies) => {
                    for movie in movies {
                        if self.admissible(&movie, facets) {
                            pool.try_add(movie);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source = name, error = %e, "Chart fetch failed, skipping source");
                }
            }
        }

        if pool.len() >= self.tuning.min_pool || !facets.persons.is_empty() || facets.is_empty() {
            return;
        }
        let base = self.discover_query(facets);
        for page in self.tuning.discover_page_limit + 1..=self.tuning.discover_page_limit * 2 {
            if pool.is_full() {
                break;
            }
            match self.provider.discover(&base.clone().page(page)).await {
                Ok(movies) => {
                    if movies.is_empty() {
                        break;
                    }
                    for movie in movies {
                        pool.try_add(movie);
                    }
                }
                Err(e) => {
                    tracing::warn!(page = page, error = %e, "Extended discovery page failed, stopping");
                    break;
                }
            }
        }
    }

    /// Admission filter for safety-net sources: the chart entry must still
    /// satisfy any genre and person constraint already resolved.
    fn admissible(&self, movie: &Movie, facets: &FacetSet) -> bool {
        if !facets.genres.is_empty()
            && !facets.genres.iter().any(|g| movie.genre_ids.contains(&g.id))
        {
            return false;
        }
        if !facets.persons.is_empty() && !facets.persons.iter().all(|p| p.matches(movie.id)) {
            return false;
        }
        true
    }

    /// Stage 6: backfill missing vote averages and release dates with
    /// bounded-concurrency detail fetches, capped to bound latency and cost.
    async fn backfill_details(&self, pool: &mut CandidatePool) {
        let missing = pool.ids_missing_fields();
        if missing.is_empty() {
            return;
        }

        let capped: Vec<u64> = missing
            .into_iter()
            .take(self.tuning.detail_fetch_cap)
            .collect();
        let requested = capped.len();

        let fetched: Vec<Movie> = stream::iter(capped)
            .map(|id| async move {
                match self.provider.movie_details(id).await {
                    Ok(movie) => Some(movie),
                    Err(e) if e.is_transient() => {
                        tracing::warn!(movie_id = id, error = %e, "Detail backfill failed");
                        None
                    }
                    Err(e) => {
                        tracing::error!(movie_id = id, error = %e, "Detail backfill failed");
                        None
                    }
                }
            })
            .buffer_unordered(self.tuning.detail_concurrency.max(1))
            .filter_map(|movie| async move { movie })
            .collect()
            .await;

        tracing::debug!(
            requested = requested,
            fetched = fetched.len(),
            "Detail backfill completed"
        );

        for movie in fetched {
            pool.merge_details(movie);
        }
    }

    /// Stage 7: genre membership, exact rating semantics, then the year
    /// filter with two-tier widening for relative constraints.
    fn apply_filters(
        &self,
        movies: Vec<Movie>,
        facets: &FacetSet,
        current_year: i32,
    ) -> Vec<Movie> {
        let mut survivors = movies;

        if !facets.genres.is_empty() {
            // Credit-list candidates are not pre-filtered by genre, so the
            // AND across facets is enforced here for every source.
            survivors.retain(|m| facets.genres.iter().any(|g| m.genre_ids.contains(&g.id)));
        }

        if let Some(rating) = &facets.rating {
            // A candidate whose vote average is still unknown after backfill
            // cannot prove it satisfies the constraint.
            survivors.retain(|m| m.vote_average.is_some_and(|v| rating.matches(v)));
        }

        if let Some(year) = &facets.year {
            let year_filter = |movies: &[Movie], window: i32| -> Vec<Movie> {
                movies
                    .iter()
                    .filter(|m| match m.release_year() {
                        Some(y) => year.contains(y, window, current_year),
                        None => facets.include_unknown_year,
                    })
                    .cloned()
                    .collect()
            };

            let narrow = year_filter(&survivors, self.tuning.narrow_year_window);
            survivors = if year.is_relative() && narrow.len() < self.tuning.suggestion_limit {
                let wide = year_filter(&survivors, self.tuning.wide_year_window);
                tracing::debug!(
                    narrow = narrow.len(),
                    wide = wide.len(),
                    "Year window widened"
                );
                wide
            } else {
                narrow
            };
        }

        survivors
    }

    /// Combined provider-side query for the no-person discovery path. Year
    /// bounds use the wide window for recall; the narrow-first semantics are
    /// applied client-side in [`Self::apply_filters`].
    fn discover_query(&self, facets: &FacetSet) -> DiscoverQuery {
        let mut query = DiscoverQuery {
            genre_ids: facets.genre_ids(),
            ..DiscoverQuery::default()
        };

        if let Some(year) = &facets.year {
            let current_year = chrono::Utc::now().year();
            let (start, end) = year.bounds(self.tuning.wide_year_window, current_year);
            query.year_min = Some(start);
            query.year_max = Some(end);
        }

        if let Some(rating) = &facets.rating {
            let (min, max) = rating.discover_bounds(self.tuning.rating_epsilon);
            query.vote_min = min;
            query.vote_max = max;
        }

        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenreRef, PersonRef, RatingComparator, RatingConstraint, YearConstraint};
    use crate::services::providers::MockMovieProvider;
    use std::collections::HashSet;

    fn movie(id: u64) -> Movie {
        Movie {
            id,
            title: format!("Movie {}", id),
            poster_path: None,
            overview: None,
            release_date: None,
            genre_ids: Vec::new(),
            vote_average: None,
            popularity: 0.0,
        }
    }

    fn rated_movie(id: u64, genre: u64, vote: f64) -> Movie {
        let mut m = movie(id);
        m.genre_ids = vec![genre];
        m.vote_average = Some(vote);
        m.release_date = Some("2015-01-01".to_string());
        m
    }

    fn person(id: u64, name: &str, actor: &[u64], director: &[u64]) -> PersonRef {
        let credits: Vec<Movie> = actor.iter().chain(director.iter()).map(|id| movie(*id)).collect();
        PersonRef {
            id,
            canonical_name: name.to_string(),
            actor_credits: actor.iter().copied().collect(),
            director_credits: director.iter().copied().collect(),
            credits,
        }
    }

    fn tuning() -> Tuning {
        Tuning::default()
    }

    #[test]
    fn test_pool_caps_new_candidates() {
        let mut pool = CandidatePool::new(2);
        assert!(pool.try_add(movie(1)));
        assert!(pool.try_add(movie(2)));
        assert!(!pool.try_add(movie(3)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_merges_duplicates_even_at_capacity() {
        let mut pool = CandidatePool::new(1);
        pool.try_add(movie(1));

        let mut richer = movie(1);
        richer.vote_average = Some(8.0);
        assert!(pool.try_add(richer));

        let movies = pool.into_movies();
        assert_eq!(movies.len(), 1);
        assert_eq!(movies[0].vote_average, Some(8.0));
    }

    #[test]
    fn test_merge_details_never_grows_pool() {
        let mut pool = CandidatePool::new(5);
        pool.try_add(movie(1));
        pool.merge_details(movie(99));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_person_and_semantics() {
        // A acts in {10,20,30}; B directs {20,40}; only 20 co-occurs.
        let facets = FacetSet {
            persons: vec![
                person(1, "A", &[10, 20, 30], &[]),
                person(2, "B", &[], &[20, 40]),
            ],
            ..FacetSet::default()
        };

        let mut provider = MockMovieProvider::new();
        provider
            .expect_movie_details()
            .returning(|id| Ok(rated_movie(id, 28, 7.0)));
        // Sparse pool triggers the safety net; charts return nothing useful.
        provider.expect_top_rated().returning(|_| Ok(Vec::new()));
        provider.expect_popular().returning(|_| Ok(Vec::new()));

        let t = tuning();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let result = builder.build(&facets).await.unwrap();

        let ids: HashSet<u64> = result.iter().map(|m| m.id).collect();
        assert_eq!(ids, [20].into_iter().collect());
    }

    #[tokio::test]
    async fn test_person_genre_pair_fallback_recovers_empty_intersection() {
        let facets = FacetSet {
            persons: vec![
                person(1, "A", &[10], &[]),
                person(2, "B", &[], &[40]),
            ],
            genres: vec![GenreRef { id: 28, canonical_name: "Hành Động".to_string() }],
            ..FacetSet::default()
        };

        let mut provider = MockMovieProvider::new();
        provider
            .expect_discover()
            .withf(|q| q.person_id.is_some() && q.genre_ids == vec![28])
            .times(2)
            .returning(|_| Ok(vec![rated_movie(55, 28, 7.5)]));
        provider.expect_top_rated().returning(|_| Ok(Vec::new()));
        provider.expect_popular().returning(|_| Ok(Vec::new()));
        provider
            .expect_movie_details()
            .returning(|id| Ok(rated_movie(id, 28, 7.5)));

        let t = tuning();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let result = builder.build(&facets).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 55);
    }

    #[tokio::test]
    async fn test_genre_facet_also_constrains_person_credits() {
        let mut p = person(1, "A", &[10, 11], &[]);
        for m in &mut p.credits {
            m.genre_ids = if m.id == 10 { vec![28] } else { vec![35] };
        }
        let facets = FacetSet {
            persons: vec![p],
            genres: vec![GenreRef { id: 28, canonical_name: "Hành Động".to_string() }],
            ..FacetSet::default()
        };

        let mut provider = MockMovieProvider::new();
        provider.expect_top_rated().returning(|_| Ok(Vec::new()));
        provider.expect_popular().returning(|_| Ok(Vec::new()));
        provider.expect_movie_details().returning(|id| {
            Ok(rated_movie(id, if id == 10 { 28 } else { 35 }, 7.0))
        });

        let t = tuning();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let result = builder.build(&facets).await.unwrap();

        assert_eq!(result.iter().map(|m| m.id).collect::<Vec<_>>(), vec![10]);
    }

    #[tokio::test]
    async fn test_genre_discovery_path_respects_rating_filter() {
        let facets = FacetSet {
            genres: vec![GenreRef { id: 28, canonical_name: "Hành Động".to_string() }],
            rating: Some(RatingConstraint { value: 7.0, comparator: RatingComparator::Gte }),
            ..FacetSet::default()
        };

        // 30 action movies, half rated >= 7
        let mut provider = MockMovieProvider::new();
        provider.expect_discover().returning(|q| {
            if q.page == 1 {
                Ok((0..30u64)
                    .map(|i| rated_movie(i, 28, if i % 2 == 0 { 7.5 } else { 5.0 }))
                    .collect())
            } else {
                Ok(Vec::new())
            }
        });
        provider.expect_top_rated().returning(|_| Ok(Vec::new()));
        provider.expect_popular().returning(|_| Ok(Vec::new()));

        let t = tuning();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let result = builder.build(&facets).await.unwrap();

        assert!(!result.is_empty());
        for m in &result {
            assert!(m.genre_ids.contains(&28));
            assert!(m.vote_average.unwrap() >= 7.0);
        }
    }

    #[tokio::test]
    async fn test_rating_filter_drops_unknown_vote_average() {
        let facets = FacetSet {
            genres: vec![GenreRef { id: 28, canonical_name: "Hành Động".to_string() }],
            rating: Some(RatingConstraint { value: 7.0, comparator: RatingComparator::Gte }),
            ..FacetSet::default()
        };

        let mut provider = MockMovieProvider::new();
        provider.expect_discover().returning(|q| {
            if q.page == 1 {
                let mut unknown = movie(1);
                unknown.genre_ids = vec![28];
                unknown.release_date = Some("2015-01-01".to_string());
                Ok(vec![unknown, rated_movie(2, 28, 8.0)])
            } else {
                Ok(Vec::new())
            }
        });
        provider.expect_top_rated().returning(|_| Ok(Vec::new()));
        provider.expect_popular().returning(|_| Ok(Vec::new()));
        // Backfill fails for the unknown movie: it must not survive.
        provider.expect_movie_details().returning(|id| {
            Err(crate::error::AppError::ExternalApi(format!("503 for {}", id)))
        });

        let t = tuning();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let result = builder.build(&facets).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, 2);
    }

    #[tokio::test]
    async fn test_safety_net_filters_chart_entries_by_genre() {
        let facets = FacetSet {
            genres: vec![GenreRef { id: 27, canonical_name: "Kinh Dị".to_string() }],
            ..FacetSet::default()
        };

        let mut provider = MockMovieProvider::new();
        provider.expect_discover().returning(|_| Ok(Vec::new()));
        provider
            .expect_top_rated()
            .returning(|_| Ok(vec![rated_movie(1, 27, 8.0), rated_movie(2, 28, 9.0)]));
        provider
            .expect_popular()
            .returning(|_| Ok(vec![rated_movie(3, 27, 6.5)]));

        let t = tuning();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let result = builder.build(&facets).await.unwrap();

        let ids: HashSet<u64> = result.iter().map(|m| m.id).collect();
        assert_eq!(ids, [1, 3].into_iter().collect());
    }

    #[tokio::test]
    async fn test_year_widening_keeps_narrow_results() {
        // Anchor 2000, "older": narrow window is 1995..=2000, wide 1980..=2000.
        let facets = FacetSet {
            genres: vec![GenreRef { id: 18, canonical_name: "Chính Kịch".to_string() }],
            year: Some(YearConstraint::Before { anchor: Some(2000) }),
            ..FacetSet::default()
        };

        let mut provider = MockMovieProvider::new();
        provider.expect_discover().returning(|q| {
            if q.page == 1 {
                // Two in the narrow window, four only in the wide window
                Ok(vec![
                    {
                        let mut m = rated_movie(1, 18, 7.0);
                        m.release_date = Some("1998-05-01".to_string());
                        m
                    },
                    {
                        let mut m = rated_movie(2, 18, 7.0);
                        m.release_date = Some("1996-05-01".to_string());
                        m
                    },
                    {
                        let mut m = rated_movie(3, 18, 7.0);
                        m.release_date = Some("1985-05-01".to_string());
                        m
                    },
                    {
                        let mut m = rated_movie(4, 18, 7.0);
                        m.release_date = Some("1987-05-01".to_string());
                        m
                    },
                    {
                        let mut m = rated_movie(5, 18, 7.0);
                        m.release_date = Some("1990-05-01".to_string());
                        m
                    },
                    {
                        let mut m = rated_movie(6, 18, 7.0);
                        m.release_date = Some("1992-05-01".to_string());
                        m
                    },
                ])
            } else {
                Ok(Vec::new())
            }
        });
        provider.expect_top_rated().returning(|_| Ok(Vec::new()));
        provider.expect_popular().returning(|_| Ok(Vec::new()));

        let t = tuning();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let result = builder.build(&facets).await.unwrap();

        // Narrow yielded 2 (< suggestion limit), so the wide window applies
        // and strictly contains the narrow-window results.
        let ids: HashSet<u64> = result.iter().map(|m| m.id).collect();
        assert!(ids.contains(&1));
        assert!(ids.contains(&2));
        assert_eq!(ids.len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_year_excluded_by_default_and_kept_when_opted_in() {
        let base_facets = FacetSet {
            genres: vec![GenreRef { id: 18, canonical_name: "Chính Kịch".to_string() }],
            year: Some(YearConstraint::Exact(2015)),
            ..FacetSet::default()
        };

        let make_provider = || {
            let mut provider = MockMovieProvider::new();
            provider.expect_discover().returning(|q| {
                if q.page == 1 {
                    let mut dated = rated_movie(1, 18, 7.0);
                    dated.release_date = Some("2015-06-01".to_string());
                    let mut undated = rated_movie(2, 18, 7.0);
                    undated.release_date = None;
                    Ok(vec![dated, undated])
                } else {
                    Ok(Vec::new())
                }
            });
            provider.expect_top_rated().returning(|_| Ok(Vec::new()));
            provider.expect_popular().returning(|_| Ok(Vec::new()));
            // The undated movie stays undated even after backfill
            provider.expect_movie_details().returning(|id| {
                let mut m = rated_movie(id, 18, 7.0);
                m.release_date = None;
                Ok(m)
            });
            provider
        };

        let t = tuning();

        let provider = make_provider();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let excluded = builder.build(&base_facets).await.unwrap();
        assert_eq!(excluded.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1]);

        let mut opted_in = base_facets.clone();
        opted_in.include_unknown_year = true;
        let provider = make_provider();
        let builder = CandidatePoolBuilder::new(&provider, &t);
        let kept = builder.build(&opted_in).await.unwrap();
        let ids: HashSet<u64> = kept.iter().map(|m| m.id).collect();
        assert_eq!(ids, [1, 2].into_iter().collect());
    }
}
