//! Per-chunk tag extraction.
//!
//! Primary pass pulls entity-like capitalized phrases and frequent content
//! words from each chunk. When the primary pass produces nothing for the
//! whole batch, a term-frequency scoring over the batch itself takes over,
//! using the batch as its own document-frequency corpus.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use ingestkit_shared::Chunk;

/// Common English function words excluded from tag candidates.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "has", "have", "this", "that", "with", "from", "they", "will", "would", "there",
    "their", "what", "about", "which", "when", "make", "like", "time", "just", "know", "take",
    "into", "your", "some", "could", "them", "than", "then", "only", "over", "also", "after",
    "most", "such", "where", "being", "more", "very", "should", "these", "those", "other", "each",
    "because", "does", "doing", "during", "before", "between", "both", "through", "same", "here",
];

/// Assign tags to every chunk in a batch.
///
/// Tags are lower-cased, deduplicated, and ordered by descending score with
/// lexical order breaking ties; at most `top_k` are kept per chunk.
pub fn assign_tags(chunks: &mut [Chunk], top_k: usize) {
    if top_k == 0 || chunks.is_empty() {
        return;
    }

    let mut any_primary = false;
    let mut primary: Vec<Vec<String>> = Vec::with_capacity(chunks.len());
    for chunk in chunks.iter() {
        let tags = linguistic_tags(&chunk.body, top_k);
        if !tags.is_empty() {
            any_primary = true;
        }
        primary.push(tags);
    }

    if any_primary {
        for (chunk, tags) in chunks.iter_mut().zip(primary) {
            chunk.tags = tags;
        }
        return;
    }

    let bodies: Vec<&str> = chunks.iter().map(|c| c.body.as_str()).collect();
    let fallback = frequency_tags(&bodies, top_k);
    for (chunk, tags) in chunks.iter_mut().zip(fallback) {
        chunk.tags = tags;
    }
}

// ---------------------------------------------------------------------------
// Primary: linguistic candidates
// ---------------------------------------------------------------------------

/// Extract tags from one chunk body.
///
/// Candidates are capitalized multi-word phrases appearing mid-sentence
/// (entity-like) plus standalone content words of four or more letters.
/// Ranked by frequency, phrases weighted above single words.
pub fn linguistic_tags(body: &str, top_k: usize) -> Vec<String> {
    static PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[A-Z][a-z]+(?: [A-Z][a-z]+)+").expect("valid regex")
    });
    static WORD_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[A-Za-z]{4,}").expect("valid regex"));

    let text = without_code_fences(body);
    let mut scores: HashMap<String, usize> = HashMap::new();

    for m in PHRASE_RE.find_iter(&text) {
        // Sentence-initial matches are usually ordinary prose, not entities
        let at_sentence_start = text[..m.start()]
            .trim_end()
            .chars()
            .next_back()
            .is_none_or(|c| matches!(c, '.' | '!' | '?'));
        if !at_sentence_start {
            *scores.entry(m.as_str().to_lowercase()).or_default() += 3;
        }
    }

    for m in WORD_RE.find_iter(&text) {
        let word = m.as_str().to_lowercase();
        if !STOPWORDS.contains(&word.as_str()) {
            *scores.entry(word).or_default() += 1;
        }
    }

    // Words appearing once are noise in short chunks
    scores.retain(|_, count| *count >= 2);

    ranked(scores.into_iter().map(|(t, s)| (t, s as f64)), top_k)
}

// ---------------------------------------------------------------------------
// Fallback: batch-wide term frequency
// ---------------------------------------------------------------------------

/// Score terms per chunk by tf weighted with a smoothed inverse document
/// frequency computed over the batch.
pub fn frequency_tags(bodies: &[&str], top_k: usize) -> Vec<Vec<String>> {
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[A-Za-z]{3,}").expect("valid regex"));

    let tokenized: Vec<Vec<String>> = bodies
        .iter()
        .map(|body| {
            TOKEN_RE
                .find_iter(&without_code_fences(body))
                .map(|m| m.as_str().to_lowercase())
                .filter(|w| !STOPWORDS.contains(&w.as_str()))
                .collect()
        })
        .collect();

    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for tokens in &tokenized {
        let mut seen: Vec<&str> = Vec::new();
        for token in tokens {
            if !seen.contains(&token.as_str()) {
                seen.push(token);
                *doc_freq.entry(token).or_default() += 1;
            }
        }
    }

    let n = tokenized.len() as f64;
    tokenized
        .iter()
        .map(|tokens| {
            let mut tf: HashMap<&str, usize> = HashMap::new();
            for token in tokens {
                *tf.entry(token).or_default() += 1;
            }
            let scored = tf.into_iter().map(|(term, count)| {
                let df = *doc_freq.get(term).unwrap_or(&1) as f64;
                let idf = ((1.0 + n) / (1.0 + df)).ln() + 1.0;
                (term.to_string(), count as f64 * idf)
            });
            ranked(scored, top_k)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Sort descending by score, break ties lexically, keep the top K.
fn ranked(scores: impl Iterator<Item = (String, f64)>, top_k: usize) -> Vec<String> {
    let mut entries: Vec<(String, f64)> = scores.collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries.truncate(top_k);
    entries.into_iter().map(|(tag, _)| tag).collect()
}

fn without_code_fences(text: &str) -> String {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));
    FENCE_RE.replace_all(text, " ").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
