//! Tiered author resolution plus word-count derived document stats.
//!
//! Tiers run in order and stop at the first hit:
//! 1. structured metadata carried on the extracted document
//! 2. byline patterns over the opening lines of the body
//! 3. an LLM call bounded by the author mode's character budget
//!
//! The LLM tier is skipped entirely when no credential is configured.

mod llm;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use ingestkit_shared::{AuthorMode, ExtractedDocument, READING_SPEED_WPM};

pub use llm::LlmClient;

/// Opening lines of the body scanned by the heuristic tier.
const HEURISTIC_LINE_WINDOW: usize = 30;

// ---------------------------------------------------------------------------
// Resolution result
// ---------------------------------------------------------------------------

/// Which resolver tier produced the author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorMethod {
    Structured,
    Heuristic,
    Llm(AuthorMode),
}

impl fmt::Display for AuthorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured => write!(f, "structured"),
            Self::Heuristic => write!(f, "heuristic"),
            Self::Llm(mode) => write!(f, "llm:{mode}"),
        }
    }
}

/// A resolved author together with the tier that found it.
#[derive(Debug, Clone)]
pub struct AuthorResolution {
    pub author: String,
    pub method: AuthorMethod,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolve the author of an extracted document.
///
/// `llm` is the optional third tier; pass `None` when no credential is
/// available. An LLM failure is logged and treated as a miss, never an error.
pub async fn resolve_author(
    doc: &ExtractedDocument,
    mode: AuthorMode,
    llm: Option<&LlmClient>,
) -> Option<AuthorResolution> {
    if let Some(author) = doc.detected_author.as_deref() {
        let trimmed = author.trim();
        if !trimmed.is_empty() {
            return Some(AuthorResolution {
                author: trimmed.to_string(),
                method: AuthorMethod::Structured,
            });
        }
    }

    if let Some(author) = heuristic_author(&doc.markdown_body) {
        return Some(AuthorResolution {
            author,
            method: AuthorMethod::Heuristic,
        });
    }

    let client = llm?;
    match client.extract_author(&doc.title, &doc.markdown_body, mode).await {
        Ok(Some(author)) => {
            debug!(author = %author, ?mode, "llm resolved author");
            Some(AuthorResolution {
                author,
                method: AuthorMethod::Llm(mode),
            })
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, url = %doc.source_url, "llm author extraction failed, skipping tier");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tier 2: byline heuristics
// ---------------------------------------------------------------------------

/// Scan the opening lines for byline patterns like `By <Name>`,
/// `Written by <Name>`, or `Author: <Name>`.
pub fn heuristic_author(body: &str) -> Option<String> {
    static BYLINE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        [
            r"^(?i:by)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,3})\s*$",
            r"^(?i:written by)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,3})\s*$",
            r"^(?i:author):\s*([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,3})\s*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    });

    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(HEURISTIC_LINE_WINDOW)
        .find_map(|line| {
            BYLINE_RES.iter().find_map(|re| {
                re.captures(line)
                    .map(|c| c[1].trim().to_string())
                    .filter(|name| is_plausible_name(name))
            })
        })
}

/// Shape check for author names: one or more comma-separated names, each
/// made of 1 to 4 capitalized words (periods, hyphens, apostrophes allowed).
pub fn is_plausible_name(candidate: &str) -> bool {
    static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^[A-Z][a-zA-Z.'\-]*(?:\s+[A-Z][a-zA-Z.'\-]*){0,3}$").expect("valid regex")
    });

    let trimmed = candidate.trim();
    if trimmed.is_empty() || trimmed.len() > 120 {
        return false;
    }
    if trimmed.eq_ignore_ascii_case("unknown") {
        return false;
    }

    trimmed
        .split(',')
        .map(str::trim)
        .all(|name| !name.is_empty() && NAME_RE.is_match(name))
}

// ---------------------------------------------------------------------------
// Document stats
// ---------------------------------------------------------------------------

/// Word count of a Markdown body, fenced code blocks excluded.
pub fn word_count(markdown: &str) -> usize {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    FENCE_RE
        .replace_all(markdown, " ")
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_alphanumeric()))
        .count()
}

/// Reading time in whole minutes at the fixed reading speed, rounded up.
pub fn reading_time_minutes(words: usize) -> usize {
    words.div_ceil(READING_SPEED_WPM)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
