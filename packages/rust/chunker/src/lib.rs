//! Heading-aware Markdown chunking with a paragraph-grouping fallback.
//!
//! Primary split: one chunk per Markdown heading, carrying everything up to
//! the next heading. Documents without headings fall back to blank-line
//! paragraph grouping bounded by a maximum chunk size, with undersized
//! trailing chunks merged into their predecessor.

pub mod tags;

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use ingestkit_shared::{Chunk, ChunkConfig};

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").expect("valid regex"));

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```").expect("valid regex"));

/// A heading line located in the source document.
struct HeadingLine {
    start: usize,
    end: usize,
    level: u8,
    text: String,
}

/// Split a Markdown document into ordered chunks.
///
/// Text before the first heading is folded into the first heading's chunk so
/// a document with N headings yields exactly N chunks. An empty document
/// yields zero chunks.
pub fn chunk_markdown(markdown: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let trimmed = markdown.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let fences = fence_spans(trimmed);
    let headings: Vec<HeadingLine> = HEADING_RE
        .captures_iter(trimmed)
        .filter(|caps| {
            let start = caps.get(0).expect("capture 0 always present").start();
            !fences.iter().any(|&(a, b)| start >= a && start < b)
        })
        .map(|caps| {
            let m = caps.get(0).expect("capture 0 always present");
            HeadingLine {
                start: m.start(),
                end: m.end(),
                level: caps[1].len() as u8,
                text: caps[2].trim().to_string(),
            }
        })
        .collect();

    let chunks = if headings.is_empty() {
        paragraph_chunks(trimmed, config)
    } else {
        heading_chunks(trimmed, &headings)
    };

    debug!(
        chunks = chunks.len(),
        headings = headings.len(),
        "chunking complete"
    );
    chunks
}

/// Byte spans covered by fenced code blocks. An unterminated fence runs to
/// the end of the document.
fn fence_spans(md: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;

    for m in FENCE_RE.find_iter(md) {
        match open.take() {
            None => open = Some(m.start()),
            Some(start) => {
                let end = md[m.end()..]
                    .find('\n')
                    .map_or(md.len(), |i| m.end() + i);
                spans.push((start, end));
            }
        }
    }
    if let Some(start) = open {
        spans.push((start, md.len()));
    }

    spans
}

// ---------------------------------------------------------------------------
// Primary: heading split
// ---------------------------------------------------------------------------

fn heading_chunks(md: &str, headings: &[HeadingLine]) -> Vec<Chunk> {
    let preamble = md[..headings[0].start].trim();
    let mut chunks = Vec::with_capacity(headings.len());

    for (i, heading) in headings.iter().enumerate() {
        let body_end = headings.get(i + 1).map_or(md.len(), |next| next.start);
        let mut body = md[heading.end..body_end].trim().to_string();

        if i == 0 && !preamble.is_empty() {
            body = if body.is_empty() {
                preamble.to_string()
            } else {
                format!("{preamble}\n\n{body}")
            };
        }

        chunks.push(Chunk {
            heading: Some(heading.text.clone()),
            heading_level: heading.level,
            body,
            position: i,
            tags: Vec::new(),
        });
    }

    chunks
}

// ---------------------------------------------------------------------------
// Fallback: paragraph grouping
// ---------------------------------------------------------------------------

/// Group blank-line-delimited paragraphs into chunks no larger than
/// `max_chunk_chars`, then merge an undersized trailing chunk into its
/// predecessor.
fn paragraph_chunks(md: &str, config: &ChunkConfig) -> Vec<Chunk> {
    let paragraphs: Vec<&str> = md
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut bodies: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in paragraphs {
        if !current.is_empty() && current.len() + 2 + para.len() > config.max_chunk_chars {
            bodies.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current.push_str(para);
        } else {
            current.push_str("\n\n");
            current.push_str(para);
        }
    }
    if !current.is_empty() {
        bodies.push(current);
    }

    // A short tail reads better attached to the chunk before it
    if bodies.len() >= 2 {
        let last_len = bodies.last().map_or(0, String::len);
        if last_len < config.min_chunk_chars {
            let tail = bodies.pop().expect("len checked above");
            let prev = bodies.last_mut().expect("len checked above");
            prev.push_str("\n\n");
            prev.push_str(&tail);
        }
    }

    bodies
        .into_iter()
        .enumerate()
        .map(|(position, body)| Chunk {
            heading: None,
            heading_level: 0,
            body,
            position,
            tags: Vec::new(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkConfig {
        ChunkConfig::default()
    }

    #[test]
    fn empty_document_yields_zero_chunks() {
        assert!(chunk_markdown("", &config()).is_empty());
        assert!(chunk_markdown("   \n\n  ", &config()).is_empty());
    }

    #[test]
    fn two_headings_yield_two_chunks() {
        let md = "Intro paragraph before any heading.\n\n\
                  ## First Section\n\nBody of the first section.\n\n\
                  ## Second Section\n\nBody of the second section.";
        let chunks = chunk_markdown(md, &config());

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].heading.as_deref(), Some("First Section"));
        assert_eq!(chunks[1].heading.as_deref(), Some("Second Section"));
        // Preamble folds into the first chunk
        assert!(chunks[0].body.starts_with("Intro paragraph"));
        assert!(chunks[0].body.contains("Body of the first section."));
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[1].position, 1);
    }

    #[test]
    fn mixed_heading_levels_all_split() {
        let md = "# Top\n\nalpha\n\n### Deep\n\nbeta\n\n## Mid\n\ngamma";
        let chunks = chunk_markdown(md, &config());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].heading_level, 1);
        assert_eq!(chunks[1].heading.as_deref(), Some("Deep"));
        assert_eq!(chunks[1].heading_level, 3);
        assert_eq!(chunks[2].heading_level, 2);
        assert_eq!(chunks[2].body, "gamma");
    }

    #[test]
    fn heading_with_empty_body_kept() {
        let md = "## Lone Heading\n\n## Followed By\n\ntext";
        let chunks = chunk_markdown(md, &config());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].body, "");
    }

    #[test]
    fn reconstruction_preserves_order_and_text() {
        let md = "## One\n\nfirst body\n\n## Two\n\nsecond body\n\n## Three\n\nthird body";
        let chunks = chunk_markdown(md, &config());

        let rebuilt = chunks
            .iter()
            .map(Chunk::to_markdown)
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(rebuilt, md);
    }

    #[test]
    fn reconstruction_keeps_heading_levels() {
        let md = "# Top\n\nalpha\n\n### Deep\n\nbeta";
        let chunks = chunk_markdown(md, &config());

        let rebuilt = chunks
            .iter()
            .map(Chunk::to_markdown)
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(rebuilt, md);
    }

    #[test]
    fn hash_lines_inside_fences_do_not_split() {
        let md = "## Setup\n\n```bash\n# install the toolchain\necho done\n```\n\n## Usage\n\nRun it.";
        let chunks = chunk_markdown(md, &config());

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].body.contains("# install the toolchain"));
        assert_eq!(chunks[1].heading.as_deref(), Some("Usage"));
    }

    #[test]
    fn unterminated_fence_masks_to_document_end() {
        let md = "## Only\n\n```\n# not a heading\nstill code";
        let chunks = chunk_markdown(md, &config());

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].body.contains("# not a heading"));
    }

    #[test]
    fn no_headings_falls_back_to_paragraphs() {
        let md = "First paragraph of prose.\n\nSecond paragraph of prose.";
        let chunks = chunk_markdown(md, &config());

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.heading.is_none()));
    }

    #[test]
    fn paragraph_grouping_respects_max_size() {
        let para = "x".repeat(400);
        let md = vec![para.clone(); 6].join("\n\n");
        let cfg = ChunkConfig {
            max_chunk_chars: 1000,
            min_chunk_chars: 300,
            ..ChunkConfig::default()
        };
        let chunks = chunk_markdown(&md, &cfg);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.body.len() <= 1000, "chunk too large: {}", chunk.body.len());
        }
    }

    #[test]
    fn undersized_trailing_chunk_merges() {
        let big = "y".repeat(900);
        let tiny = "short tail";
        let md = format!("{big}\n\n{tiny}");
        let cfg = ChunkConfig {
            max_chunk_chars: 905,
            min_chunk_chars: 300,
            ..ChunkConfig::default()
        };
        let chunks = chunk_markdown(&md, &cfg);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].body.ends_with("short tail"));
    }

    #[test]
    fn single_paragraph_single_chunk() {
        let chunks = chunk_markdown("Just one block of text.", &config());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].body, "Just one block of text.");
        assert_eq!(chunks[0].position, 0);
    }

    #[test]
    fn positions_are_sequential() {
        let md = "## A\n\na\n\n## B\n\nb\n\n## C\n\nc\n\n## D\n\nd";
        let chunks = chunk_markdown(md, &config());
        let positions: Vec<usize> = chunks.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }
}
