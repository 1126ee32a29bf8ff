//! Structural detectors and keyword tables shared by the classifier and the lead scorer

use std::sync::LazyLock;

use regex::Regex;

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d{1,2}[/\-]\d{1,2}|\b(?:day|dia)\s+\d{1,2}")
        .expect("DATE_RE regex should compile")
});

static GUEST_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s*(?:people|persons|guests|pessoas|convidados)")
        .expect("GUEST_COUNT_RE regex should compile")
});

/// Words that signal the customer wants to book or check a date
pub const SCHEDULING_KEYWORDS: &[&str] = &[
    "book",
    "reserve",
    "reservation",
    "schedule",
    "available",
    "availability",
    "appointment",
    "reservar",
    "reserva",
    "agendar",
    "agenda",
    "marcar",
    "disponível",
    "disponivel",
    "disponibilidade",
];

/// Return the first date-like token (`12/25`, `3-10`, `day 5`), if any
pub fn find_date(text: &str) -> Option<&str> {
    DATE_RE.find(text).map(|m| m.as_str())
}

/// Return the first guest-count-like token (`100 guests`, `40 pessoas`), if any
pub fn find_guest_count(text: &str) -> Option<&str> {
    GUEST_COUNT_RE.find(text).map(|m| m.as_str())
}

/// Case-insensitive substring match against a keyword table.
///
/// `lower` must already be lowercased.
pub fn contains_any(lower: &str, words: &[&str]) -> bool {
    words.iter().any(|w| lower.contains(w))
}

/// First keyword from the table present in `lower`
pub fn first_match<'a>(lower: &str, words: &[&'a str]) -> Option<&'a str> {
    words.iter().copied().find(|w| lower.contains(w))
}
