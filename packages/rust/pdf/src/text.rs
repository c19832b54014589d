//! Content-stream walking: turns PDF text operators into positioned runs.

use lopdf::content::Content;
use lopdf::{Document, Object};
use tracing::warn;

/// One contiguous piece of text with the font size it was shown at.
#[derive(Debug, Clone)]
pub(crate) struct TextRun {
    pub text: String,
    pub font_size: f32,
    /// Logical line index, monotonically increasing in reading order.
    pub line: usize,
}

/// Walk every page's content stream and collect text runs in reading order.
///
/// Tracks `Tf` for the active font size and `Td`/`TD`/`T*` for line breaks.
/// Pages whose content stream fails to decode are skipped.
pub(crate) fn collect_runs(doc: &Document) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::new();
    let mut line = 0usize;
    let mut font_size = 0f32;

    for (page_num, page_id) in doc.get_pages() {
        let data = match doc.get_page_content(page_id) {
            Ok(data) => data,
            Err(e) => {
                warn!(page = page_num, error = %e, "unreadable page content, skipping");
                continue;
            }
        };
        let content = match Content::decode(&data) {
            Ok(content) => content,
            Err(e) => {
                warn!(page = page_num, error = %e, "content stream decode failed, skipping");
                continue;
            }
        };

        for op in &content.operations {
            match op.operator.as_str() {
                "Tf" => {
                    if let Some(size) = op.operands.get(1).and_then(object_as_f32) {
                        font_size = size;
                    }
                }
                "Td" | "TD" | "T*" | "ET" => {
                    line += 1;
                }
                "Tj" => {
                    if let Some(text) = op.operands.first().and_then(object_text) {
                        push_text(&mut runs, text, font_size, line);
                    }
                }
                "'" => {
                    line += 1;
                    if let Some(text) = op.operands.first().and_then(object_text) {
                        push_text(&mut runs, text, font_size, line);
                    }
                }
                "\"" => {
                    line += 1;
                    if let Some(text) = op.operands.get(2).and_then(object_text) {
                        push_text(&mut runs, text, font_size, line);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(parts)) = op.operands.first() {
                        let text: String = parts
                            .iter()
                            .filter_map(object_text)
                            .collect();
                        if !text.is_empty() {
                            push_text(&mut runs, text, font_size, line);
                        }
                    }
                }
                _ => {}
            }
        }

        // Page boundary is always a line boundary
        line += 1;
    }

    runs
}

/// Append text to the current run when line and size match, otherwise start a
/// new run.
fn push_text(runs: &mut Vec<TextRun>, text: String, font_size: f32, line: usize) {
    if text.trim().is_empty() {
        return;
    }

    if let Some(last) = runs.last_mut() {
        if last.line == line && (last.font_size - font_size).abs() < f32::EPSILON {
            last.text.push_str(&text);
            return;
        }
    }

    runs.push(TextRun {
        text,
        font_size,
        line,
    });
}

fn object_as_f32(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn object_text(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// Decode a PDF string: UTF-16BE when BOM-prefixed, Latin-1 otherwise.
pub(crate) fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&utf16)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
