use crate::models::{Genre, GenreRef};

use super::normalize_text;

/// Leading filler words carrying no genre information ("phim hành động" and
/// "action movie" both reduce to the genre term)
const FILLER_PREFIXES: &[&str] = &["phim ", "the loai ", "movie ", "movies ", "film "];

/// Genre-term normalization: accent fold plus filler-prefix strip
fn normalize_genre(term: &str) -> String {
    let mut normalized = normalize_text(term);
    loop {
        let Some(prefix) = FILLER_PREFIXES.iter().find(|p| normalized.starts_with(**p)) else {
            break;
        };
        normalized = normalized[prefix.len()..].trim_start().to_string();
    }
    normalized
}

/// Matches user-supplied genre terms against the catalog taxonomy.
///
/// Exact normalized equality wins; a second pass accepts catalog names that
/// contain the user term. Returns matched genres (deduplicated, in match
/// order) and the terms that matched nothing.
pub fn match_genres(taxonomy: &[Genre], terms: &[String]) -> (Vec<GenreRef>, Vec<String>) {
    let normalized_taxonomy: Vec<(String, &Genre)> = taxonomy
        .iter()
        .map(|g| (normalize_genre(&g.name), g))
        .collect();

    let mut matched: Vec<GenreRef> = Vec::new();
    let mut unmatched: Vec<String> = Vec::new();

    for term in terms {
        let normalized_term = normalize_genre(term);
        if normalized_term.is_empty() {
            continue;
        }

        let hit = normalized_taxonomy
            .iter()
            .find(|(name, _)| *name == normalized_term)
            .or_else(|| {
                normalized_taxonomy
                    .iter()
                    .find(|(name, _)| name.contains(&normalized_term))
            });

        match hit {
            Some((_, genre)) => {
                if !matched.iter().any(|m| m.id == genre.id) {
                    matched.push(GenreRef {
                        id: genre.id,
                        canonical_name: genre.name.clone(),
                    });
                }
            }
            None => {
                tracing::debug!(term = %term, "Genre term matched nothing in taxonomy");
                unmatched.push(term.clone());
            }
        }
    }

    (matched, unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Vec<Genre> {
        vec![
            Genre { id: 28, name: "Hành Động".to_string() },
            Genre { id: 27, name: "Kinh Dị".to_string() },
            Genre { id: 878, name: "Khoa Học Viễn Tưởng".to_string() },
            Genre { id: 10749, name: "Lãng Mạn".to_string() },
        ]
    }

    #[test]
    fn test_exact_match_ignores_accents_and_case() {
        let (matched, unmatched) = match_genres(&taxonomy(), &["hanh dong".to_string()]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 28);
        assert!(unmatched.is_empty());
    }

    #[test]
    fn test_filler_prefix_is_stripped() {
        let (matched, _) = match_genres(&taxonomy(), &["phim kinh dị".to_string()]);
        assert_eq!(matched[0].id, 27);
    }

    #[test]
    fn test_containment_fallback() {
        // "viễn tưởng" is contained in "Khoa Học Viễn Tưởng"
        let (matched, _) = match_genres(&taxonomy(), &["viễn tưởng".to_string()]);
        assert_eq!(matched[0].id, 878);
    }

    #[test]
    fn test_same_term_with_different_accents_matches_same_id() {
        let (first, _) = match_genres(&taxonomy(), &["HÀNH ĐỘNG".to_string()]);
        let (second, _) = match_genres(&taxonomy(), &["hành động".to_string()]);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn test_unmatched_terms_are_collected() {
        let (matched, unmatched) =
            match_genres(&taxonomy(), &["hành động".to_string(), "nhạc kịch".to_string()]);
        assert_eq!(matched.len(), 1);
        assert_eq!(unmatched, vec!["nhạc kịch".to_string()]);
    }

    #[test]
    fn test_duplicate_matches_are_deduplicated() {
        let (matched, _) = match_genres(
            &taxonomy(),
            &["hành động".to_string(), "phim hanh dong".to_string()],
        );
        assert_eq!(matched.len(), 1);
    }
}
