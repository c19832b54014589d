//! PDF document extraction with font-size based heading detection.
//!
//! Walks the document's content streams to recover text runs with their font
//! sizes, finds the body-text mode, and promotes oversized or short all-caps
//! runs to section headings. Output is Markdown with `##` section headers so
//! the chunker downstream can split along the same boundaries as HTML pages.

mod text;

use std::collections::BTreeMap;
use std::collections::HashMap;

use lopdf::{Document, Object};
use tracing::{debug, instrument};

use ingestkit_shared::{ExtractedDocument, IngestError, PdfConfig, Result, SourceKind};

use text::TextRun;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Extract a PDF into an [`ExtractedDocument`] with `source_kind = pdf`.
///
/// Heading detection works off two signals, compared against the document's
/// most common (mode) font size:
/// - font size at or above `mode * heading_ratio`
/// - all-caps runs of at most `caps_word_ceiling` words
///
/// Unparseable or encrypted input fails with [`IngestError::UnreadablePdf`].
/// A parseable PDF with no text yields an empty body, not an error.
#[instrument(skip(bytes), fields(filename = %filename, len = bytes.len()))]
pub fn extract_pdf(bytes: &[u8], filename: &str, config: &PdfConfig) -> Result<ExtractedDocument> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| IngestError::UnreadablePdf(format!("{filename}: {e}")))?;

    if doc.is_encrypted() {
        return Err(IngestError::UnreadablePdf(format!(
            "{filename}: document is encrypted"
        )));
    }

    let runs = text::collect_runs(&doc);
    let info = document_info(&doc);

    let body_mode = body_font_mode(&runs);
    let sections = split_sections(&runs, body_mode, config);
    let markdown_body = render_markdown(&sections);

    let first_heading = sections.iter().find_map(|s| s.heading.clone());
    let title = info
        .title
        .clone()
        .or(first_heading)
        .unwrap_or_else(|| filename.to_string());

    let mut raw_metadata = BTreeMap::new();
    if let Some(t) = &info.title {
        raw_metadata.insert("title".to_string(), serde_json::Value::String(t.clone()));
    }
    if let Some(a) = &info.author {
        raw_metadata.insert("author".to_string(), serde_json::Value::String(a.clone()));
    }
    if let Some(d) = &info.creation_date {
        raw_metadata.insert("date".to_string(), serde_json::Value::String(d.clone()));
    }

    debug!(
        runs = runs.len(),
        sections = sections.len(),
        body_mode,
        title = %title,
        "pdf extraction complete"
    );

    Ok(ExtractedDocument {
        title,
        markdown_body,
        raw_metadata,
        detected_author: info.author,
        published_date: info.creation_date,
        outbound_links: Vec::new(),
        source_kind: SourceKind::Pdf,
        source_url: filename.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Heading detection
// ---------------------------------------------------------------------------

struct Section {
    heading: Option<String>,
    body_lines: Vec<String>,
}

/// Most common font size across all runs, weighted by run length.
///
/// Sizes are bucketed at 0.5pt resolution. Returns 0.0 for an empty document.
fn body_font_mode(runs: &[TextRun]) -> f32 {
    let mut weights: HashMap<i64, usize> = HashMap::new();
    for run in runs {
        let bucket = (run.font_size * 2.0).round() as i64;
        *weights.entry(bucket).or_default() += run.text.len();
    }

    weights
        .into_iter()
        .max_by_key(|(_, weight)| *weight)
        .map(|(bucket, _)| bucket as f32 / 2.0)
        .unwrap_or(0.0)
}

fn is_heading_run(run: &TextRun, body_mode: f32, config: &PdfConfig) -> bool {
    // Strictly above the body size, so a ratio of 1.0 never promotes body text
    if body_mode > 0.0
        && run.font_size > body_mode
        && f64::from(run.font_size) >= f64::from(body_mode) * config.heading_ratio
    {
        return true;
    }

    let trimmed = run.text.trim();
    let has_letters = trimmed.chars().any(|c| c.is_alphabetic());
    let word_count = trimmed.split_whitespace().count();
    has_letters
        && word_count > 0
        && word_count <= config.caps_word_ceiling
        && !trimmed.chars().any(|c| c.is_lowercase())
}

/// Split runs into sections at heading boundaries.
///
/// Consecutive heading runs on the same logical line merge into one heading.
/// Runs before the first heading form a headingless preamble section.
fn split_sections(runs: &[TextRun], body_mode: f32, config: &PdfConfig) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section {
        heading: None,
        body_lines: Vec::new(),
    };
    let mut last_heading_line: Option<usize> = None;

    for run in runs {
        let trimmed = run.text.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_heading_run(run, body_mode, config) {
            if last_heading_line == Some(run.line) {
                if let Some(heading) = &mut current.heading {
                    heading.push(' ');
                    heading.push_str(trimmed);
                    continue;
                }
            }

            if current.heading.is_some() || !current.body_lines.is_empty() {
                sections.push(current);
            }
            current = Section {
                heading: Some(trimmed.to_string()),
                body_lines: Vec::new(),
            };
            last_heading_line = Some(run.line);
        } else {
            current.body_lines.push(trimmed.to_string());
            last_heading_line = None;
        }
    }

    if current.heading.is_some() || !current.body_lines.is_empty() {
        sections.push(current);
    }

    sections
}

fn render_markdown(sections: &[Section]) -> String {
    let mut parts = Vec::new();

    for section in sections {
        let body = section.body_lines.join("\n");
        match &section.heading {
            Some(heading) => {
                if body.is_empty() {
                    parts.push(format!("## {heading}"));
                } else {
                    parts.push(format!("## {heading}\n\n{body}"));
                }
            }
            None => {
                if !body.is_empty() {
                    parts.push(body);
                }
            }
        }
    }

    parts.join("\n\n")
}

// ---------------------------------------------------------------------------
// Document info dictionary
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DocumentInfo {
    title: Option<String>,
    author: Option<String>,
    creation_date: Option<String>,
}

fn document_info(doc: &Document) -> DocumentInfo {
    let mut info = DocumentInfo::default();

    let Ok(info_obj) = doc.trailer.get(b"Info") else {
        return info;
    };
    let Ok(info_id) = info_obj.as_reference() else {
        return info;
    };
    let Ok(dict) = doc.get_dictionary(info_id) else {
        return info;
    };

    info.title = info_string(dict, b"Title");
    info.author = info_string(dict, b"Author");
    info.creation_date = info_string(dict, b"CreationDate");
    info
}

fn info_string(dict: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::String(bytes, _)) => {
            let s = text::decode_pdf_string(bytes);
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
