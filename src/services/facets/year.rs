use std::sync::OnceLock;

use regex::Regex;

use crate::models::{SlotValue, YearConstraint};

use super::normalize_text;

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").unwrap())
}

/// "newer/recent" tokens, matched on normalized (accent-stripped) text
fn newer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(moi|gan day|sau|tro di|new|newer|recent|latest|after|since)\b").unwrap()
    })
}

/// "older" tokens
fn older_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(cu|xua|co dien|truoc|old|older|classic|before|earlier)\b").unwrap()
    })
}

fn plausible_year(year: i32, current_year: i32) -> bool {
    (1880..=current_year + 2).contains(&year)
}

/// Parses a year constraint from a slot value.
///
/// Recognizes explicit two-element ranges, one or two 4-digit years embedded
/// in free text, and relative comparator words ("newer"/"older", English and
/// Vietnamese) with or without an anchor year. Relative constraints are
/// resolved to concrete windows later, with progressive widening.
pub fn parse_year(value: &SlotValue, current_year: i32) -> Option<YearConstraint> {
    // Explicit 2-element range, e.g. [2000, 2010]
    if let SlotValue::List(items) = value {
        let years: Vec<i32> = items
            .iter()
            .filter_map(SlotValue::as_number)
            .map(|n| n as i32)
            .filter(|y| plausible_year(*y, current_year))
            .collect();
        if years.len() >= 2 {
            return Some(YearConstraint::Range { start: years[0], end: years[1] });
        }
    }

    let text = value.to_canonical_list().join(" ");
    if text.is_empty() {
        return None;
    }
    let normalized = normalize_text(&text);

    let years: Vec<i32> = year_re()
        .find_iter(&normalized)
        .filter_map(|m| m.as_str().parse().ok())
        .filter(|y| plausible_year(*y, current_year))
        .collect();

    let newer = newer_re().is_match(&normalized);
    let older = older_re().is_match(&normalized);

    match (years.as_slice(), newer, older) {
        ([start, end, ..], _, _) => Some(YearConstraint::Range { start: *start, end: *end }),
        ([anchor], true, _) => Some(YearConstraint::After { anchor: Some(*anchor) }),
        ([anchor], _, true) => Some(YearConstraint::Before { anchor: Some(*anchor) }),
        ([year], false, false) => Some(YearConstraint::Exact(*year)),
        ([], true, _) => Some(YearConstraint::After { anchor: None }),
        ([], _, true) => Some(YearConstraint::Before { anchor: None }),
        ([], false, false) => None,
    }
}
