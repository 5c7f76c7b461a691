/// Facet resolvers
///
/// Independent normalizers that turn raw NLU slot values into canonical
/// facets. Resolution is best-effort throughout: a genre with no taxonomy
/// match or a person the catalog does not know is recorded for user feedback
/// and never aborts the turn.
use std::collections::BTreeMap;

use chrono::Datelike;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

use crate::{
    config::Tuning,
    error::AppResult,
    models::{FacetSet, SlotValue},
    services::providers::MovieProvider,
};

pub mod genre;
pub mod person;
pub mod rating;
pub mod year;

/// Slot names the NLU service uses for each facet
const GENRE_SLOTS: &[&str] = &["genre", "genres"];
const PERSON_SLOTS: &[&str] = &["person", "actor", "director", "people"];
const YEAR_SLOTS: &[&str] = &["date", "year", "date-period", "time"];
const RATING_SLOT: &str = "rating";
const COMPARATOR_SLOTS: &[&str] = &["comparator", "operator"];
/// Alternate raw date parameter; its presence opts unknown-year candidates in
const RAW_DATE_SLOT: &str = "date_time";

/// Accent-insensitive normalization shared by the genre and person matchers:
/// NFD fold, combining marks stripped, Vietnamese đ mapped to d, lowercased,
/// whitespace collapsed.
pub(crate) fn normalize_text(input: &str) -> String {
    let stripped: String = input
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'đ' => 'd',
            'Đ' => 'D',
            _ => c,
        })
        .collect();

    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn slot_strings(params: &BTreeMap<String, SlotValue>, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| params.get(*key))
        .flat_map(SlotValue::to_canonical_list)
        .collect()
}

/// Resolves the slot-filled parameters of one turn into a [`FacetSet`].
///
/// Issues no provider calls for facets that are absent from the input, so an
/// empty parameter map resolves without touching the catalog at all.
pub async fn resolve_facets(
    provider: &dyn MovieProvider,
    params: &BTreeMap<String, SlotValue>,
    tuning: &Tuning,
) -> AppResult<FacetSet> {
    let mut facets = FacetSet {
        include_unknown_year: params.contains_key(RAW_DATE_SLOT),
        ..FacetSet::default()
    };

    let genre_terms = slot_strings(params, GENRE_SLOTS);
    if !genre_terms.is_empty() {
        match provider.genres().await {
            Ok(taxonomy) => {
                let (matched, unmatched) = genre::match_genres(&taxonomy, &genre_terms);
                facets.genres = matched;
                facets.unmatched_genres = unmatched;
            }
            Err(e) => {
                // Taxonomy unavailable: skip the genre branch, keep the rest
                tracing::warn!(error = %e, "Genre taxonomy unavailable, skipping genre facet");
                facets.unmatched_genres = genre_terms;
            }
        }
    }

    let person_names = slot_strings(params, PERSON_SLOTS);
    if !person_names.is_empty() {
        let (resolved, unresolved) =
            person::resolve_persons(provider, &person_names, tuning.credit_concurrency).await;
        facets.persons = resolved;
        facets.unresolved_persons = unresolved;
    }

    if let Some(value) = params.get(RATING_SLOT) {
        let comparator = COMPARATOR_SLOTS.iter().find_map(|key| params.get(*key));
        facets.rating = rating::parse_rating(value, comparator);
    }

    let current_year = chrono::Utc::now().year();
    facets.year = YEAR_SLOTS
        .iter()
        .filter_map(|key| params.get(*key))
        .find_map(|value| year::parse_year(value, current_year));

    tracing::debug!(
        persons = facets.persons.len(),
        genres = facets.genres.len(),
        year = ?facets.year,
        rating = ?facets.rating,
        unresolved_persons = facets.unresolved_persons.len(),
        unmatched_genres = facets.unmatched_genres.len(),
        "Facets resolved"
    );

    Ok(facets)
}
