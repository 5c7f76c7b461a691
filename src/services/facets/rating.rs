use std::sync::OnceLock;

use regex::Regex;

use crate::models::{RatingComparator, RatingConstraint, SlotValue};

use super::normalize_text;

/// Comparator embedded in the value itself, e.g. ">=7" or "> 8.5"
fn embedded_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(>=|=>|<=|=<|>|<|=)?\s*(\d+(?:[.,]\d+)?)\s*$").unwrap())
}

/// Normalizes a comparator token (symbol or word, English or Vietnamese)
fn parse_comparator_token(token: &str) -> Option<RatingComparator> {
    match token.trim() {
        ">=" | "=>" => return Some(RatingComparator::Gte),
        "<=" | "=<" => return Some(RatingComparator::Lte),
        ">" => return Some(RatingComparator::Gt),
        "<" => return Some(RatingComparator::Lt),
        "=" | "==" => return Some(RatingComparator::Eq),
        _ => {}
    }

    match normalize_text(token).as_str() {
        "gte" | "at least" | "it nhat" | "toi thieu" | "tu" | "minimum" => {
            Some(RatingComparator::Gte)
        }
        "gt" | "over" | "above" | "more than" | "greater" | "tren" | "hon" | "cao hon" => {
            Some(RatingComparator::Gt)
        }
        "lte" | "at most" | "toi da" | "maximum" => Some(RatingComparator::Lte),
        "lt" | "under" | "below" | "less than" | "duoi" | "thap hon" => Some(RatingComparator::Lt),
        "eq" | "exactly" | "equal" | "bang" | "khoang" => Some(RatingComparator::Eq),
        _ => None,
    }
}

/// Parses a rating constraint from the rating slot plus an optional
/// comparator slot. The comparator may be a symbol, a word, or embedded in
/// the value string itself; anything unrecognized defaults to equality.
pub fn parse_rating(value: &SlotValue, comparator: Option<&SlotValue>) -> Option<RatingConstraint> {
    let mut parsed_value: Option<f64> = None;
    let mut parsed_comparator: Option<RatingComparator> = None;

    if let Some(text) = value.to_canonical_list().first() {
        if let Some(captures) = embedded_re().captures(text) {
            parsed_value = captures
                .get(2)
                .and_then(|m| m.as_str().replace(',', ".").parse().ok());
            parsed_comparator = captures
                .get(1)
                .and_then(|m| parse_comparator_token(m.as_str()));
        }
    }

    let value = parsed_value.or_else(|| value.as_number())?;

    let comparator = parsed_comparator
        .or_else(|| {
            comparator
                .into_iter()
                .flat_map(SlotValue::to_canonical_list)
                .find_map(|token| parse_comparator_token(&token))
        })
        .unwrap_or(RatingComparator::Eq);

    Some(RatingConstraint { value, comparator })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbolic_comparator_slot() {
        let constraint = parse_rating(
            &SlotValue::Number(7.0),
            Some(&SlotValue::Text(">=".to_string())),
        )
        .unwrap();
        assert_eq!(constraint.value, 7.0);
        assert_eq!(constraint.comparator, RatingComparator::Gte);
    }

    #[test]
    fn test_embedded_comparator() {
        let constraint = parse_rating(&SlotValue::Text(">=7".to_string()), None).unwrap();
        assert_eq!(constraint.value, 7.0);
        assert_eq!(constraint.comparator, RatingComparator::Gte);

        let constraint = parse_rating(&SlotValue::Text("< 8.5".to_string()), None).unwrap();
        assert_eq!(constraint.value, 8.5);
        assert_eq!(constraint.comparator, RatingComparator::Lt);
    }

    #[test]
    fn test_word_comparators() {
        let gt = parse_rating(
            &SlotValue::Number(7.0),
            Some(&SlotValue::Text("trên".to_string())),
        )
        .unwrap();
        assert_eq!(gt.comparator, RatingComparator::Gt);

        let lt = parse_rating(
            &SlotValue::Number(5.0),
            Some(&SlotValue::Text("under".to_string())),
        )
        .unwrap();
        assert_eq!(lt.comparator, RatingComparator::Lt);
    }

    #[test]
    fn test_unrecognized_comparator_defaults_to_eq() {
        let constraint = parse_rating(
            &SlotValue::Number(6.0),
            Some(&SlotValue::Text("whatever".to_string())),
        )
        .unwrap();
        assert_eq!(constraint.comparator, RatingComparator::Eq);
    }

    #[test]
    fn test_missing_comparator_defaults_to_eq() {
        let constraint = parse_rating(&SlotValue::Number(6.0), None).unwrap();
        assert_eq!(constraint.comparator, RatingComparator::Eq);
    }

    #[test]
    fn test_comma_decimal_separator() {
        let constraint = parse_rating(&SlotValue::Text(">7,5".to_string()), None).unwrap();
        assert_eq!(constraint.value, 7.5);
        assert_eq!(constraint.comparator, RatingComparator::Gt);
    }

    #[test]
    fn test_non_numeric_value_yields_nothing() {
        assert!(parse_rating(&SlotValue::Text("hay".to_string()), None).is_none());
        assert!(parse_rating(&SlotValue::Null, None).is_none());
    }
}
