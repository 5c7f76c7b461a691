use std::collections::{HashMap, HashSet};

use futures::{stream, StreamExt};

use crate::{
    error::AppResult,
    models::{Movie, PersonRef, PersonSearchResult},
    services::providers::MovieProvider,
};

use super::normalize_text;

const DIRECTOR_JOB: &str = "Director";

/// Picks the best match from person search results: exact normalized name
/// first, then substring containment either way, then highest popularity.
fn disambiguate(results: Vec<PersonSearchResult>, query: &str) -> Option<PersonSearchResult> {
    if results.is_empty() {
        return None;
    }

    let normalized_query = normalize_text(query);

    if let Some(exact) = results
        .iter()
        .find(|r| normalize_text(&r.name) == normalized_query)
    {
        return Some(exact.clone());
    }

    if let Some(substring) = results.iter().find(|r| {
        let name = normalize_text(&r.name);
        name.contains(&normalized_query) || normalized_query.contains(&name)
    }) {
        return Some(substring.clone());
    }

    results
        .into_iter()
        .max_by(|a, b| a.popularity.total_cmp(&b.popularity))
}

/// Builds the role-aware credit index for a resolved person.
///
/// Cast credits fill the actor set; crew credits count only when the job is
/// directing. The deduplicated movie records ride along so the pool builder
/// does not fetch the credit list a second time.
async fn build_person_ref(
    provider: &dyn MovieProvider,
    person: PersonSearchResult,
) -> AppResult<PersonRef> {
    let credits = provider.person_credits(person.id).await?;

    let mut actor_credits: HashSet<u64> = HashSet::new();
    let mut director_credits: HashSet<u64> = HashSet::new();
    let mut movies: HashMap<u64, Movie> = HashMap::new();

    for movie in credits.cast {
        actor_credits.insert(movie.id);
        movies
            .entry(movie.id)
            .and_modify(|existing| existing.merge(movie.clone()))
            .or_insert(movie);
    }

    for credit in credits.crew {
        if credit.job.as_deref() != Some(DIRECTOR_JOB) {
            continue;
        }
        director_credits.insert(credit.movie.id);
        movies
            .entry(credit.movie.id)
            .and_modify(|existing| existing.merge(credit.movie.clone()))
            .or_insert(credit.movie);
    }

    Ok(PersonRef {
        id: person.id,
        canonical_name: person.name,
        actor_credits,
        director_credits,
        credits: movies.into_values().collect(),
    })
}

/// Resolves free-form person names against the catalog with bounded
/// parallelism. Names that resolve to nothing (no search hit, or a transient
/// provider failure) are collected separately for user feedback; the other
/// names still resolve.
pub async fn resolve_persons(
    provider: &dyn MovieProvider,
    names: &[String],
    concurrency: usize,
) -> (Vec<PersonRef>, Vec<String>) {
    let outcomes: Vec<(String, Option<PersonRef>)> = stream::iter(names.iter().cloned())
        .map(|name| async move {
            let resolved = resolve_one(provider, &name).await;
            (name, resolved)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();

    for (name, outcome) in outcomes {
        match outcome {
            Some(person) => resolved.push(person),
            None => unresolved.push(name),
        }
    }

    // Keep the caller's ordering stable despite unordered completion
    resolved.sort_by_key(|p| {
        names
            .iter()
            .position(|n| normalize_text(n) == normalize_text(&p.canonical_name))
            .unwrap_or(usize::MAX)
    });

    (resolved, unresolved)
}

async fn resolve_one(provider: &dyn MovieProvider, name: &str) -> Option<PersonRef> {
    let results = match provider.search_person(name).await {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!(name = %name, error = %e, "Person search failed");
            return None;
        }
    };

    let person = disambiguate(results, name)?;

    match build_person_ref(provider, person).await {
        Ok(person_ref) => Some(person_ref),
        Err(e) => {
            tracing::warn!(name = %name, error = %e, "Person credit fetch failed");
            None
        }
    }
}
