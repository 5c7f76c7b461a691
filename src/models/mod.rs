use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod facets;

pub use facets::{FacetSet, GenreRef, PersonRef, RatingComparator, RatingConstraint, YearConstraint};

// ============================================================================
// Catalog types
// ============================================================================

/// A candidate movie record from the metadata provider.
///
/// Identity is the provider-native id. Fields other than the id may be missing
/// on records coming from list endpoints and are backfilled lazily from the
/// detail endpoint when a filter needs them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    /// Nullable; "unknown year" is a valid state
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
    /// Nullable until backfilled from the detail endpoint
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub popularity: f64,
}

impl Movie {
    /// Four-digit release year, when known. Empty date strings from the
    /// provider count as unknown.
    pub fn release_year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(0..4))
            .and_then(|y| y.parse().ok())
    }

    /// Shallow-merges a later-seen record over this one, keeping the most
    /// complete data: present fields win, absent fields never erase.
    pub fn merge(&mut self, other: Movie) {
        if !other.title.is_empty() {
            self.title = other.title;
        }
        if other.poster_path.is_some() {
            self.poster_path = other.poster_path;
        }
        if other.overview.is_some() {
            self.overview = other.overview;
        }
        if other.release_date.as_deref().is_some_and(|d| !d.is_empty()) {
            self.release_date = other.release_date;
        }
        if !other.genre_ids.is_empty() {
            self.genre_ids = other.genre_ids;
        }
        if other.vote_average.is_some() {
            self.vote_average = other.vote_average;
        }
        if other.popularity > 0.0 {
            self.popularity = other.popularity;
        }
    }
}

/// Genre taxonomy entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

/// Person search result from the metadata provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonSearchResult {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub popularity: f64,
}

/// A person's full credit list, split by involvement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonCredits {
    #[serde(default)]
    pub cast: Vec<Movie>,
    #[serde(default)]
    pub crew: Vec<CrewCredit>,
}

/// Crew credit: a movie plus the job the person held on it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewCredit {
    #[serde(flatten)]
    pub movie: Movie,
    #[serde(default)]
    pub job: Option<String>,
}

// ============================================================================
// NLU types
// ============================================================================

/// A slot value as delivered by the NLU service.
///
/// Parameter values arrive as string, number, list, or nested object depending
/// on how the utterance was annotated; every facet resolver goes through
/// [`SlotValue::to_canonical_list`] instead of sniffing shapes ad hoc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SlotValue {
    Number(f64),
    Text(String),
    List(Vec<SlotValue>),
    Object(BTreeMap<String, SlotValue>),
    Null,
}

impl SlotValue {
    /// Flattens the value into a list of non-empty strings, recursing through
    /// arbitrary nesting. Objects contribute their `name` field when present,
    /// otherwise their values in key order.
    pub fn to_canonical_list(&self) -> Vec<String> {
        match self {
            SlotValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![trimmed.to_string()]
                }
            }
            SlotValue::Number(n) => {
                if n.fract() == 0.0 {
                    vec![format!("{}", *n as i64)]
                } else {
                    vec![format!("{}", n)]
                }
            }
            SlotValue::List(items) => items.iter().flat_map(SlotValue::to_canonical_list).collect(),
            SlotValue::Object(map) => {
                if let Some(name) = map.get("name") {
                    name.to_canonical_list()
                } else {
                    map.values().flat_map(SlotValue::to_canonical_list).collect()
                }
            }
            SlotValue::Null => Vec::new(),
        }
    }

    /// Best-effort numeric view of the value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SlotValue::Number(n) => Some(*n),
            SlotValue::Text(s) => s.trim().parse().ok(),
            SlotValue::List(items) => items.first().and_then(SlotValue::as_number),
            SlotValue::Object(map) => map
                .get("value")
                .or_else(|| map.get("amount"))
                .or_else(|| map.get("number"))
                .and_then(SlotValue::as_number),
            SlotValue::Null => None,
        }
    }
}

/// Unified NLU output for one conversational turn
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluResult {
    /// Original user utterance, needed when the intent is ambiguous
    pub query_text: String,
    pub intent_name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, SlotValue>,
    #[serde(default)]
    pub all_required_slots_filled: bool,
}

// ============================================================================
// Intent classification
// ============================================================================

/// The closed set of intents this core can fulfill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Facet-driven recommendation (genre/person/year/rating)
    RecommendMovies,
    /// "Movies like X" seeded from a named title
    RecommendByName,
    /// Personalized recommendation
    RecommendPersonalized,
    /// Ambiguous or unsupported utterance
    Fallback,
}

impl Intent {
    pub const KNOWN: &'static [Intent] = &[
        Intent::RecommendMovies,
        Intent::RecommendByName,
        Intent::RecommendPersonalized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::RecommendMovies => "movie_recommendation_request",
            Intent::RecommendByName => "recommend_movie_by_name",
            Intent::RecommendPersonalized => "recommend_personalization",
            Intent::Fallback => "fallback",
        }
    }

    /// Maps an NLU intent name onto the closed set; anything unknown is
    /// treated as the fallback intent and routed through the cascade.
    pub fn from_name(name: &str) -> Intent {
        match name {
            "movie_recommendation_request" => Intent::RecommendMovies,
            "recommend_movie_by_name" => Intent::RecommendByName,
            "recommend_personalization" => Intent::RecommendPersonalized,
            _ => Intent::Fallback,
        }
    }
}

/// Which cascade tier produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationMethod {
    KeywordPattern,
    LocalClassifier,
    RemoteLlm,
    Heuristic,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationMethod::KeywordPattern => "keyword_pattern",
            ClassificationMethod::LocalClassifier => "local_classifier",
            ClassificationMethod::RemoteLlm => "remote_llm",
            ClassificationMethod::Heuristic => "heuristic",
        }
    }
}

/// Outcome of the classification cascade
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub method: ClassificationMethod,
}

// ============================================================================
// Response contract
// ============================================================================

/// One movie card in the user-facing reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovieSuggestion {
    pub id: u64,
    pub title: String,
    pub poster: Option<String>,
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
}

/// The response shape consumed by the downstream chat/persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub fulfillment_messages: Vec<FulfillmentMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FulfillmentMessage {
    Text { text: TextBlock },
    Suggestions { #[serde(rename = "movieSuggestions")] movie_suggestions: Vec<MovieSuggestion> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: Vec<String>,
}

impl FulfillmentMessage {
    pub fn text(message: impl Into<String>) -> Self {
        FulfillmentMessage::Text {
            text: TextBlock {
                text: vec![message.into()],
            },
        }
    }

    pub fn suggestions(movie_suggestions: Vec<MovieSuggestion>) -> Self {
        FulfillmentMessage::Suggestions { movie_suggestions }
    }
}

impl ResponsePayload {
    /// A single-message text reply
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            fulfillment_messages: vec![FulfillmentMessage::text(text)],
        }
    }

    /// A header text followed by a movie suggestion list
    pub fn with_suggestions(header: impl Into<String>, suggestions: Vec<MovieSuggestion>) -> Self {
        Self {
            fulfillment_messages: vec![
                FulfillmentMessage::text(header),
                FulfillmentMessage::suggestions(suggestions),
            ],
        }
    }

    pub fn suggestions(&self) -> &[MovieSuggestion] {
        self.fulfillment_messages
            .iter()
            .find_map(|m| match m {
                FulfillmentMessage::Suggestions { movie_suggestions } => {
                    Some(movie_suggestions.as_slice())
                }
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn first_text(&self) -> Option<&str> {
        self.fulfillment_messages.iter().find_map(|m| match m {
            FulfillmentMessage::Text { text } => text.text.first().map(String::as_str),
            _ => None,
        })
    }
}
