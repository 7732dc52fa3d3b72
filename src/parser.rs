//! Card identifier parsing
//!
//! Turns noisy recognized text into a (set code, number, denominator)
//! triple such as `DRI 104/182`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Set code, whitespace, number, slash, denominator: `DRI 104/182`
const SPACED_PATTERN: &str = r"\b([A-Z]{2,4})\s+(\d{1,3})\s*/\s*(\d{2,4})\b";

/// Same without the gap between code and number: `DRI104/182`
const FUSED_PATTERN: &str = r"\b([A-Z]{2,4})(\d{1,3})\s*/\s*(\d{2,4})\b";

/// Shortest leftover text worth sending as a name search
pub const MIN_SEARCH_TEXT_LEN: usize = 3;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_/\s-]").expect("valid regex"));
static PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(SPACED_PATTERN).expect("valid regex"),
        Regex::new(FUSED_PATTERN).expect("valid regex"),
    ]
});

/// Identifier printed at the bottom of a card
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardIdentifier {
    /// Short alphabetic set code (PTCGO code)
    pub set_code: String,
    /// Card number within the set
    pub number: String,
    /// Printed set size
    pub denom: String,
}

impl fmt::Display for CardIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.set_code, self.number, self.denom)
    }
}

/// Collapse whitespace, replace anything that is not a word character,
/// slash, hyphen or whitespace with a space, collapse again and trim.
pub fn clean(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let stripped = NOISE.replace_all(&collapsed, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Find a card identifier in recognized text.
///
/// The spaced form is tried before the fused one; the first match wins.
pub fn extract(text: &str) -> Option<CardIdentifier> {
    let upper = clean(text).to_uppercase();

    PATTERNS.iter().find_map(|re| {
        let caps = re.captures(&upper)?;
        Some(CardIdentifier {
            set_code: caps[1].to_string(),
            number: caps[2].to_string(),
            denom: caps[3].to_string(),
        })
    })
}

/// Whether cleaned text is long enough to try as a name search
pub fn is_searchable_text(cleaned: &str) -> bool {
    cleaned.trim().chars().count() >= MIN_SEARCH_TEXT_LEN
}
