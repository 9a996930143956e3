//! Track-title normalization shared by the listing parser and the match engine.

use std::sync::LazyLock;

use regex::Regex;

/// Quote characters removed from titles: ASCII double and single quotes, the
/// curly single quotes (left, right, high-reversed-9) and the curly double
/// quotes (left, right).
pub const QUOTE_CHARS: [char; 7] = [
    '"', '\'', '\u{2018}', '\u{2019}', '\u{201B}', '\u{201C}', '\u{201D}',
];

/// An opening bracket followed by a featuring token, through to the end of the
/// string. Substring match, so `(ft.`, `[Feat` and `(featuring` all qualify.
static FEATURING_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)[\[(]+(?:featuring|feat|ft).*$").expect("featuring regex is valid")
});

/// Remove every quote character without inserting anything in its place.
pub fn strip_quotes(text: &str) -> String {
    text.chars().filter(|c| !QUOTE_CHARS.contains(c)).collect()
}

/// Remove a bracketed featuring clause and everything after it.
pub fn strip_featuring(text: &str) -> String {
    FEATURING_CLAUSE.replace(text, "").into_owned()
}

/// Normalize a raw track title: strip quotes, strip a trailing featuring
/// clause, trim. The order matters, since a quote can sit between the bracket
/// and the token (`("feat. X")`).
///
/// Casing is left alone; comparisons lowercase at the call site.
pub fn normalize_track_name(raw_title: &str) -> String {
    strip_featuring(&strip_quotes(raw_title)).trim().to_string()
}
