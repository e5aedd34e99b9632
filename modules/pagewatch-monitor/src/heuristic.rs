use pagewatch_common::{Goal, HeuristicResult};

/// Generic unavailability phrases checked on every site in addition to the
/// site's own negative hints.
pub const BUILTIN_NEGATIVE_HINTS: &[&str] = &[
    "sold out",
    "fully booked",
    "no availability",
    "not available",
    "unavailable",
    "no tables available",
    "currently unavailable",
    "booked up",
    "no reservations available",
];

/// Cheap local pre-filter. A hit needs a positive keyword, no negative hint,
/// and the target date (when set) in `YYYY-MM-DD` or `YYYYMMDD` form.
pub fn evaluate(text: &str, goal: &Goal) -> HeuristicResult {
    let haystack = text.to_lowercase();

    let keywords: Vec<&str> = goal
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && haystack.contains(&k.to_lowercase()))
        .collect();

    let mut hints: Vec<&str> = goal.negative_hints.iter().map(|h| h.trim()).collect();
    hints.extend_from_slice(BUILTIN_NEGATIVE_HINTS);
    let negatives: Vec<&str> = hints
        .into_iter()
        .filter(|h| !h.is_empty() && haystack.contains(&h.to_lowercase()))
        .collect();

    let date_found = goal.target_date.map(|date| {
        let iso = date.format("%Y-%m-%d").to_string();
        let compact = date.format("%Y%m%d").to_string();
        text.contains(&iso) || text.contains(&compact)
    });

    let hit = !keywords.is_empty() && negatives.is_empty() && date_found.unwrap_or(true);

    let mut parts = Vec::new();
    if goal.keywords.is_empty() {
        parts.push("keywords: none configured".to_string());
    } else if keywords.is_empty() {
        parts.push("keywords: none matched".to_string());
    } else {
        parts.push(format!("keywords: {}", keywords.join(", ")));
    }
    if !negatives.is_empty() {
        parts.push(format!("negative: {}", negatives.join(", ")));
    }
    match (goal.target_date, date_found) {
        (Some(date), Some(true)) => parts.push(format!("date {date} found")),
        (Some(date), _) => parts.push(format!("date {date} missing")),
        (None, _) => {}
    }

    HeuristicResult {
        hit,
        detail: parts.join("; "),
    }
}
