//! Core domain types for the ingestkit pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fixed reading-speed constant for the reading-time estimate (words/minute).
pub const READING_SPEED_WPM: usize = 200;

// ---------------------------------------------------------------------------
// Source items
// ---------------------------------------------------------------------------

/// What kind of source a locator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    Pdf,
}

/// A PDF binary attachment in a batch submission.
#[derive(Debug, Clone)]
pub struct PdfAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// One fetch target, created when a batch is parsed or when the frontier
/// expands a page's links. Consumed once by the pipeline.
#[derive(Debug, Clone)]
pub enum SourceItem {
    Url(String),
    Pdf(PdfAttachment),
}

impl SourceItem {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Url(_) => SourceKind::Url,
            Self::Pdf(_) => SourceKind::Pdf,
        }
    }

    /// URL string, or PDF filename. Used to name the item in logs.
    pub fn locator(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Pdf(attachment) => &attachment.filename,
        }
    }
}

// ---------------------------------------------------------------------------
// Extracted documents
// ---------------------------------------------------------------------------

/// Normalized result of fetching + extracting one source item. Owned by the
/// pipeline for the duration of one item's processing; not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub title: String,
    pub markdown_body: String,
    /// OpenGraph / JSON-LD key-values, merged.
    #[serde(default)]
    pub raw_metadata: BTreeMap<String, serde_json::Value>,
    /// Author found in structured metadata (resolver tier 1 input).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    /// Absolute same-document anchor targets, source order, deduplicated.
    #[serde(default)]
    pub outbound_links: Vec<String>,
    pub source_kind: SourceKind,
    /// Originating URL, or PDF filename.
    pub source_url: String,
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// One unit of the final content. Chunks from one document, concatenated in
/// position order with headings re-inserted, reconstruct the document's
/// content modulo whitespace normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Markdown heading depth (hash count) of `heading`; 1 through 6.
    #[serde(default = "default_heading_level")]
    pub heading_level: u8,
    pub body: String,
    /// 0-based ordinal within the document.
    pub position: usize,
    /// Topical tags assigned by the auto-tagger.
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_heading_level() -> u8 {
    2
}

impl Chunk {
    /// Render the chunk back to markdown, heading re-inserted at its
    /// original level.
    pub fn to_markdown(&self) -> String {
        match &self.heading {
            Some(h) => {
                let hashes = "#".repeat(usize::from(self.heading_level.clamp(1, 6)));
                format!("{hashes} {h}\n\n{}", self.body)
            }
            None => self.body.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output schema
// ---------------------------------------------------------------------------

/// Document-level content classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Blog,
    Book,
    Other,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Blog => "blog",
            Self::Book => "book",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// The externally visible record: one per chunk that survives filtering,
/// carrying the same author/metadata as its parent document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    pub title: String,
    pub content: String,
    pub content_type: ContentType,
    /// URL or PDF filename.
    pub source_url: String,
    pub author: String,
    /// Resolver tier that produced the author: `structured`, `heuristic`,
    /// or `llm:<mode>`. Absent when no tier matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_method: Option<String>,
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Crawl records
// ---------------------------------------------------------------------------

/// One crawled page and the URLs discovered on it (`UrlData` in the external
/// schema). `found_urls` is deduplicated against everything already seen at
/// any depth of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRecord {
    pub original_url: String,
    pub depth_level: u32,
    pub found_urls: Vec<String>,
}

// ---------------------------------------------------------------------------
// Raw diagnostic trace
// ---------------------------------------------------------------------------

/// A fenced code block detected in markdown, with its 0-based index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub index: usize,
    pub content: String,
}

/// Per-source extraction intermediates kept for downstream diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTrace {
    pub source_url: String,
    pub title: String,
    /// Pre-chunking markdown body.
    pub markdown: String,
    #[serde(default)]
    pub raw_metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    pub word_count: usize,
    pub reading_time_minutes: usize,
    /// Union of the document's chunk tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// SHA-256 of the markdown body, for idempotence checks.
    pub content_hash: String,
}

// ---------------------------------------------------------------------------
// Batch request / result
// ---------------------------------------------------------------------------

/// Author-detection cost/accuracy tradeoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorMode {
    CostSaving,
    #[default]
    Balanced,
    Accuracy,
}

impl AuthorMode {
    /// Maximum characters of document content sent to the LLM call.
    pub fn char_budget(&self) -> usize {
        match self {
            Self::CostSaving => 200,
            Self::Balanced => 500,
            Self::Accuracy => 1000,
        }
    }

    /// Completion-token cap declared per call.
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::CostSaving => 32,
            Self::Balanced => 64,
            Self::Accuracy => 128,
        }
    }
}

impl std::fmt::Display for AuthorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CostSaving => "cost_saving",
            Self::Balanced => "balanced",
            Self::Accuracy => "accuracy",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AuthorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cost_saving" => Ok(Self::CostSaving),
            "balanced" => Ok(Self::Balanced),
            "accuracy" => Ok(Self::Accuracy),
            other => Err(format!("unknown author mode: {other}")),
        }
    }
}

/// A heterogeneous batch submission.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    pub team_id: String,
    pub user_id: String,
    pub author_mode: AuthorMode,
    pub urls: Vec<String>,
    pub pdfs: Vec<PdfAttachment>,
    /// Crawl depth for single-URL submissions. 0 = no crawling.
    pub depth: u32,
    /// URLs the caller has excluded from crawling (continuation requests).
    pub exclude_urls: Vec<String>,
}

/// The top-level pipeline output. Constructed fresh per batch, fully
/// populated, then handed to the caller, who owns persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub team_id: String,
    pub items: Vec<OutputItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crawl_records: Vec<CrawlRecord>,
    #[serde(default)]
    pub raw_trace: Vec<SourceTrace>,
    #[serde(default)]
    pub processing_log: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_mode_budgets() {
        assert_eq!(AuthorMode::CostSaving.char_budget(), 200);
        assert_eq!(AuthorMode::Balanced.char_budget(), 500);
        assert_eq!(AuthorMode::Accuracy.char_budget(), 1000);
    }

    #[test]
    fn author_mode_roundtrip() {
        for mode in [
            AuthorMode::CostSaving,
            AuthorMode::Balanced,
            AuthorMode::Accuracy,
        ] {
            let parsed: AuthorMode = mode.to_string().parse().expect("parse mode");
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn source_item_kind_and_locator() {
        let url = SourceItem::Url("https://example.com/post".into());
        assert_eq!(url.kind(), SourceKind::Url);
        assert_eq!(url.locator(), "https://example.com/post");

        let pdf = SourceItem::Pdf(PdfAttachment {
            filename: "notes.pdf".into(),
            bytes: vec![],
        });
        assert_eq!(pdf.kind(), SourceKind::Pdf);
        assert_eq!(pdf.locator(), "notes.pdf");
    }

    #[test]
    fn content_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ContentType::Blog).unwrap(), "\"blog\"");
        assert_eq!(serde_json::to_string(&ContentType::Book).unwrap(), "\"book\"");
        assert_eq!(serde_json::to_string(&ContentType::Other).unwrap(), "\"other\"");
    }

    #[test]
    fn chunk_to_markdown_reinserts_heading() {
        let chunk = Chunk {
            heading: Some("Intro".into()),
            heading_level: 2,
            body: "Some text.".into(),
            position: 0,
            tags: vec![],
        };
        assert_eq!(chunk.to_markdown(), "## Intro\n\nSome text.");

        let bare = Chunk {
            heading: None,
            heading_level: 2,
            body: "Just a paragraph.".into(),
            position: 1,
            tags: vec![],
        };
        assert_eq!(bare.to_markdown(), "Just a paragraph.");
    }

    #[test]
    fn chunk_to_markdown_keeps_heading_level() {
        let top = Chunk {
            heading: Some("Top".into()),
            heading_level: 1,
            body: "alpha".into(),
            position: 0,
            tags: vec![],
        };
        assert_eq!(top.to_markdown(), "# Top\n\nalpha");

        let deep = Chunk {
            heading: Some("Deep".into()),
            heading_level: 3,
            body: "beta".into(),
            position: 1,
            tags: vec![],
        };
        assert_eq!(deep.to_markdown(), "### Deep\n\nbeta");
    }

    #[test]
    fn output_item_omits_absent_author_method() {
        let item = OutputItem {
            title: "T".into(),
            content: "c".into(),
            content_type: ContentType::Blog,
            source_url: "https://example.com/".into(),
            author: String::new(),
            author_method: None,
            user_id: "u1".into(),
        };
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("author_method"));
    }

    #[test]
    fn crawl_record_external_field_names() {
        let record = CrawlRecord {
            original_url: "https://example.com/".into(),
            depth_level: 1,
            found_urls: vec!["https://example.com/a".into()],
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"original_url\""));
        assert!(json.contains("\"depth_level\":1"));
        assert!(json.contains("\"found_urls\""));
    }

    #[test]
    fn batch_result_roundtrip() {
        let result = BatchResult {
            team_id: "team-1".into(),
            items: vec![],
            crawl_records: vec![],
            raw_trace: vec![],
            processing_log: vec!["fetched https://example.com/".into()],
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: BatchResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.team_id, "team-1");
        assert_eq!(parsed.processing_log.len(), 1);
        // Empty crawl_records are omitted entirely.
        assert!(!json.contains("crawl_records"));
    }
}
