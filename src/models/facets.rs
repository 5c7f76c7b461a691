use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Movie;

/// A person resolved against the catalog, with role-aware credit indexes.
///
/// `actor_credits` and `director_credits` are built from the person's full
/// credit list, fetched once per request. `credits` holds the deduplicated
/// movie records themselves so the pool builder does not re-fetch them.
#[derive(Debug, Clone)]
pub struct PersonRef {
    pub id: u64,
    pub canonical_name: String,
    pub actor_credits: HashSet<u64>,
    pub director_credits: HashSet<u64>,
    pub credits: Vec<Movie>,
}

impl PersonRef {
    /// Whether a movie satisfies this person's constraint.
    ///
    /// Actor-only people match their acting credits, director-only people
    /// their directing credits; people with both kinds of credits match the
    /// union.
    pub fn matches(&self, movie_id: u64) -> bool {
        match (self.actor_credits.is_empty(), self.director_credits.is_empty()) {
            (false, true) => self.actor_credits.contains(&movie_id),
            (true, false) => self.director_credits.contains(&movie_id),
            (false, false) => {
                self.actor_credits.contains(&movie_id)
                    || self.director_credits.contains(&movie_id)
            }
            (true, true) => false,
        }
    }
}

/// A genre matched against the catalog taxonomy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreRef {
    pub id: u64,
    pub canonical_name: String,
}

/// Year criterion extracted from the utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearConstraint {
    Exact(i32),
    Range { start: i32, end: i32 },
    /// "older", "classic": at or before the anchor (current year when absent)
    Before { anchor: Option<i32> },
    /// "newer", "recent": at or after the anchor (window back from the
    /// current year when absent)
    After { anchor: Option<i32> },
}

impl YearConstraint {
    /// Relative constraints are the ones subject to two-tier window widening
    pub fn is_relative(&self) -> bool {
        matches!(self, YearConstraint::Before { .. } | YearConstraint::After { .. })
    }

    /// Inclusive year bounds for the given window size.
    ///
    /// Exact years and explicit ranges ignore the window. Anchored relative
    /// constraints extend away from the anchor; unanchored ones extend back
    /// from the current year.
    pub fn bounds(&self, window: i32, current_year: i32) -> (i32, i32) {
        match *self {
            YearConstraint::Exact(year) => (year, year),
            YearConstraint::Range { start, end } => {
                if start <= end {
                    (start, end)
                } else {
                    (end, start)
                }
            }
            YearConstraint::Before { anchor } => {
                let a = anchor.unwrap_or(current_year);
                (a - window, a)
            }
            YearConstraint::After { anchor } => match anchor {
                Some(a) => (a, a + window),
                None => (current_year - window, current_year),
            },
        }
    }

    /// Whether a known year falls inside the windowed bounds
    pub fn contains(&self, year: i32, window: i32, current_year: i32) -> bool {
        let (start, end) = self.bounds(window, current_year);
        (start..=end).contains(&year)
    }
}

/// Rating comparator, normalized from symbols/words/embedded tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingComparator {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
}

/// Rating criterion: a vote-average threshold plus comparator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingConstraint {
    pub value: f64,
    pub comparator: RatingComparator,
}

impl RatingConstraint {
    pub fn matches(&self, vote_average: f64) -> bool {
        match self.comparator {
            RatingComparator::Gte => vote_average >= self.value,
            RatingComparator::Gt => vote_average > self.value,
            RatingComparator::Lte => vote_average <= self.value,
            RatingComparator::Lt => vote_average < self.value,
            RatingComparator::Eq => (vote_average - self.value).abs() < 0.5,
        }
    }

    /// Inclusive bounds for provider-side discovery. Strict comparators are
    /// emulated with a small epsilon offset since the provider only supports
    /// inclusive bounds; the exact semantics are re-applied client-side.
    pub fn discover_bounds(&self, epsilon: f64) -> (Option<f64>, Option<f64>) {
        match self.comparator {
            RatingComparator::Gte => (Some(self.value), None),
            RatingComparator::Gt => (Some(self.value + epsilon), None),
            RatingComparator::Lte => (None, Some(self.value)),
            RatingComparator::Lt => (None, Some(self.value - epsilon)),
            RatingComparator::Eq => (Some(self.value - 0.5), Some(self.value + 0.5)),
        }
    }
}

/// The resolved query criteria for one conversational turn.
///
/// Created fresh per request and discarded once the response is built.
#[derive(Debug, Clone, Default)]
pub struct FacetSet {
    pub persons: Vec<PersonRef>,
    pub genres: Vec<GenreRef>,
    pub year: Option<YearConstraint>,
    pub rating: Option<RatingConstraint>,
    /// Keep unknown-year candidates through the year filter. Set when the
    /// request supplied an alternate raw date parameter.
    pub include_unknown_year: bool,
    /// Person names the resolver could not match, kept for user feedback
    pub unresolved_persons: Vec<String>,
    /// Genre terms with no taxonomy match, kept for user feedback
    pub unmatched_genres: Vec<String>,
}

impl FacetSet {
    /// No usable facet at all: the pipeline short-circuits with a
    /// clarification instead of touching the provider.
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
            && self.genres.is_empty()
            && self.year.is_none()
            && self.rating.is_none()
    }

    pub fn genre_ids(&self) -> Vec<u64> {
        self.genres.iter().map(|g| g.id).collect()
    }
}
