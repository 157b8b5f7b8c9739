//! Cosmetic output-language guess used for syntax highlighting.

use serde::{Deserialize, Serialize};

/// Language tag attached to the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Java,
    Html,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Java => "java",
            Language::Html => "html",
        }
    }
}

/// Checked in order; the first language with a matching keyword wins.
const KEYWORDS: &[(Language, &[&str])] = &[
    (Language::Javascript, &["javascript", "js"]),
    (Language::Java, &["java"]),
    (Language::Html, &["html", "css"]),
];

/// Guess the requested output language from the client request.
///
/// Plain case-insensitive substring scan, defaulting to Python. Never used
/// for control flow.
pub fn infer_language(request: &str) -> Language {
    let lowered = request.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|word| lowered.contains(word)))
        .map_or(Language::Python, |(language, _)| *language)
}
