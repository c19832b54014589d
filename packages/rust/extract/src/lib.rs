//! HTML page extraction: content selection, Markdown conversion, metadata.
//!
//! Takes a fetched HTML page and produces an [`ExtractedDocument`] with a clean
//! Markdown body, page metadata (OpenGraph, JSON-LD, bylines), and the page's
//! outbound links for crawl discovery.

mod cleanup;
mod metadata;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use ingestkit_shared::{CodeBlock, ExtractedDocument, IngestError, Result, SourceKind};

pub use metadata::PageMetadata;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Extract a full document from an HTML page.
///
/// Steps:
/// 1. Collect page metadata (OpenGraph, `article:` tags, JSON-LD, bylines)
/// 2. Select the main content container, excluding page chrome
/// 3. Pre-process tables, convert HTML to Markdown via `htmd`
/// 4. Run the Markdown cleanup pipeline
/// 5. Collect outbound links for crawl discovery
///
/// Returns [`IngestError::EmptyContent`] when no meaningful text survives.
#[instrument(skip(html), fields(url = %source_url))]
pub fn extract_html(html: &str, source_url: &str) -> Result<ExtractedDocument> {
    let doc = Html::parse_document(html);

    let meta = metadata::collect(&doc);

    let content_html = select_content_html(&doc, html);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec![
            "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
            "form",
        ])
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| IngestError::Conversion(format!("htmd conversion failed: {e}")))?;

    let base_url = Url::parse(source_url).ok();
    let markdown_body = cleanup::run_pipeline(&raw_markdown, base_url.as_ref());

    if markdown_body.trim().is_empty() {
        return Err(IngestError::EmptyContent {
            url: source_url.to_string(),
        });
    }

    let title = meta
        .title
        .clone()
        .or_else(|| first_h1(&doc))
        .or_else(|| page_title(&doc))
        .unwrap_or_else(|| "Untitled".to_string());

    let outbound_links = collect_outbound_links(&doc, base_url.as_ref());

    debug!(
        title = %title,
        body_len = markdown_body.len(),
        links = outbound_links.len(),
        author = meta.detected_author.as_deref().unwrap_or(""),
        "extraction complete"
    );

    Ok(ExtractedDocument {
        title,
        markdown_body,
        raw_metadata: meta.raw,
        detected_author: meta.detected_author,
        published_date: meta.published_date,
        outbound_links,
        source_kind: SourceKind::Url,
        source_url: source_url.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Content selection
// ---------------------------------------------------------------------------

/// Container candidates. The one with the largest chrome-excluded text
/// weight wins; ties keep the earlier candidate.
const CONTENT_SELECTORS: &[&str] = &["main", "article", "[role=\"main\"]", ".content"];

/// Subtrees that never count toward a candidate's text weight.
const CHROME_TAGS: &[&str] = &["nav", "header", "footer", "aside", "script", "style", "noscript"];

/// Pick the HTML fragment holding the main page content.
///
/// Every matching candidate is scored by the length of its text with chrome
/// subtrees excluded, and the heaviest one is returned. Falls back to
/// `<body>`, then the raw input.
fn select_content_html(doc: &Html, raw_html: &str) -> String {
    let mut best: Option<(usize, String)> = None;

    for sel_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        for el in doc.select(&selector) {
            let weight = content_text_weight(el);
            if weight > 0 && best.as_ref().is_none_or(|(w, _)| weight > *w) {
                best = Some((weight, el.inner_html()));
            }
        }
    }

    if let Some((_, html)) = best {
        return html;
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).next() {
            return body.inner_html();
        }
    }

    raw_html.to_string()
}

/// Total trimmed text length under an element, skipping chrome subtrees.
fn content_text_weight(el: scraper::ElementRef) -> usize {
    let mut total = 0;
    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => total += text.trim().len(),
            scraper::Node::Element(element) => {
                if CHROME_TAGS.contains(&element.name()) {
                    continue;
                }
                if let Some(child_el) = scraper::ElementRef::wrap(child) {
                    total += content_text_weight(child_el);
                }
            }
            _ => {}
        }
    }
    total
}

/// Extract the text of the first `<h1>` element.
fn first_h1(doc: &Html) -> Option<String> {
    let sel = Selector::parse("h1").ok()?;
    doc.select(&sel).next().map(|el| {
        el.text().collect::<String>().trim().to_string()
    }).filter(|t| !t.is_empty())
}

/// Extract the `<title>` element text.
fn page_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Outbound link discovery
// ---------------------------------------------------------------------------

/// Collect absolute http(s) outbound links, fragment-stripped, in document
/// order with duplicates removed.
fn collect_outbound_links(doc: &Html, base_url: Option<&Url>) -> Vec<String> {
    let Ok(sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();

    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("javascript:")
        {
            continue;
        }

        let resolved = match base_url {
            Some(base) => base.join(href).ok(),
            None => Url::parse(href).ok(),
        };
        let Some(mut resolved) = resolved else {
            continue;
        };

        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        resolved.set_fragment(None);

        let as_str = resolved.to_string();
        if seen.insert(as_str.clone()) {
            links.push(as_str);
        }
    }

    links
}

// ---------------------------------------------------------------------------
// Code block collection
// ---------------------------------------------------------------------------

/// Collect fenced code blocks from a Markdown body, indexed in order.
pub fn fenced_code_blocks(markdown: &str) -> Vec<CodeBlock> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[^\n]*\n(.*?)```").expect("valid regex")
    });

    FENCE_RE
        .captures_iter(markdown)
        .enumerate()
        .map(|(index, caps)| CodeBlock {
            index,
            content: caps[1].trim_end().to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Table pre-processing
// ---------------------------------------------------------------------------

/// Convert HTML `<table>` elements to Markdown tables before htmd conversion.
///
/// `htmd` 0.1 does not convert tables itself.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let table_sel = Selector::parse("table").expect("valid selector");

    if doc.select(&table_sel).next().is_none() {
        return html.to_string();
    }

    let mut result = html.to_string();
    for table_el in doc.select(&table_sel) {
        let table_html = table_el.html();
        let md_table = html_table_to_markdown(&table_el);
        result = result.replacen(&table_html, &md_table, 1);
    }

    result
}

fn html_table_to_markdown(table: &scraper::ElementRef) -> String {
    let tr_sel = Selector::parse("tr").expect("valid selector");
    let th_sel = Selector::parse("th").expect("valid selector");
    let td_sel = Selector::parse("td").expect("valid selector");

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut has_header = false;

    for tr in table.select(&tr_sel) {
        let ths: Vec<String> = tr
            .select(&th_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if !ths.is_empty() {
            has_header = true;
            rows.push(ths);
            continue;
        }

        let tds: Vec<String> = tr
            .select(&td_sel)
            .map(|cell| cell.text().collect::<String>().trim().to_string())
            .collect();

        if !tds.is_empty() {
            rows.push(tds);
        }
    }

    if rows.is_empty() {
        return String::new();
    }

    let col_count = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if col_count == 0 {
        return String::new();
    }

    for row in &mut rows {
        while row.len() < col_count {
            row.push(String::new());
        }
    }

    let mut md = String::from("\n\n");

    md.push_str("| ");
    md.push_str(&rows[0].join(" | "));
    md.push_str(" |\n");

    md.push_str("| ");
    md.push_str(&(0..col_count).map(|_| "---").collect::<Vec<_>>().join(" | "));
    md.push_str(" |\n");

    let data_start = if has_header { 1 } else { 0 };
    for row in &rows[data_start..] {
        md.push_str("| ");
        md.push_str(&row.join(" | "));
        md.push_str(" |\n");
    }

    md.push('\n');
    md
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_simple_page() {
        let html = "<html><head><title>Page</title></head><body><main><h1>Hello World</h1><p>Some body text here.</p></main></body></html>";
        let doc = extract_html(html, "https://example.com/post").unwrap();

        assert_eq!(doc.title, "Hello World");
        assert!(doc.markdown_body.contains("Hello World"));
        assert!(doc.markdown_body.contains("Some body text here."));
        assert_eq!(doc.source_kind, SourceKind::Url);
        assert_eq!(doc.source_url, "https://example.com/post");
    }

    #[test]
    fn extract_prefers_og_title() {
        let html = r#"<html><head>
            <title>Site - Page</title>
            <meta property="og:title" content="The Real Title">
        </head><body><main><h1>H1 Title</h1><p>Text.</p></main></body></html>"#;

        let doc = extract_html(html, "https://example.com/").unwrap();
        assert_eq!(doc.title, "The Real Title");
    }

    #[test]
    fn extract_falls_back_to_h1_then_title() {
        let html = "<html><head><title>Tab Title</title></head><body><main><p>No headings here, just text.</p></main></body></html>";
        let doc = extract_html(html, "https://example.com/").unwrap();
        assert_eq!(doc.title, "Tab Title");
    }

    #[test]
    fn extract_excludes_chrome() {
        let html = r#"<html><body>
            <nav><a href="/">Home</a> <a href="/about">About</a></nav>
            <main><h1>Content</h1><p>Important text.</p></main>
            <footer><p>Copyright 2025 Example Corp</p></footer>
        </body></html>"#;

        let doc = extract_html(html, "https://example.com/").unwrap();
        assert!(doc.markdown_body.contains("Important text."));
        assert!(!doc.markdown_body.contains("Copyright 2025"));
    }

    #[test]
    fn heaviest_container_wins_over_first_match() {
        let html = r#"<html><body>
            <main><p>Banner</p></main>
            <article><h1>Real Story</h1><p>The actual long body of the page,
            with more than enough text to outweigh the banner.</p></article>
        </body></html>"#;

        let doc = extract_html(html, "https://example.com/").unwrap();
        assert!(doc.markdown_body.contains("actual long body"));
        assert!(!doc.markdown_body.contains("Banner"));
    }

    #[test]
    fn chrome_text_does_not_count_toward_selection() {
        let html = r#"<html><body>
            <main>
                <nav>Home About Archive Search Tags Categories Contact Feed</nav>
                <p>tiny</p>
            </main>
            <article><p>The real article body with meaningful prose.</p></article>
        </body></html>"#;

        let doc = extract_html(html, "https://example.com/").unwrap();
        assert!(doc.markdown_body.contains("real article body"));
        assert!(!doc.markdown_body.contains("tiny"));
    }

    #[test]
    fn extract_empty_page_is_error() {
        let html = "<html><body><main><nav>only nav</nav></main></body></html>";
        let err = extract_html(html, "https://example.com/empty").unwrap_err();
        assert!(matches!(err, IngestError::EmptyContent { .. }));
    }

    #[test]
    fn extract_preserves_code_blocks() {
        let html = r#"<html><body><main>
            <h1>Code</h1>
            <pre><code class="language-rust">fn main() {}</code></pre>
        </main></body></html>"#;

        let doc = extract_html(html, "https://example.com/code").unwrap();
        assert!(doc.markdown_body.contains("```rust"));
        assert!(doc.markdown_body.contains("fn main() {}"));

        let blocks = fenced_code_blocks(&doc.markdown_body);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].index, 0);
        assert_eq!(blocks[0].content, "fn main() {}");
    }

    #[test]
    fn code_block_interior_whitespace_survives() {
        let html = "<html><body><main><h1>Code</h1>\
                    <pre><code>first line\n\n\n\nlast line\n</code></pre>\
                    </main></body></html>";

        let doc = extract_html(html, "https://example.com/code").unwrap();
        assert!(doc.markdown_body.contains("first line\n\n\n\nlast line"));
    }

    #[test]
    fn extract_converts_tables() {
        let html = r#"<html><body><main>
            <h1>Data</h1>
            <table>
                <thead><tr><th>Name</th><th>Value</th></tr></thead>
                <tbody><tr><td>foo</td><td>bar</td></tr></tbody>
            </table>
        </main></body></html>"#;

        let doc = extract_html(html, "https://example.com/data").unwrap();
        assert!(doc.markdown_body.contains("| Name | Value |"));
        assert!(doc.markdown_body.contains("| foo | bar |"));
    }

    // --- Outbound links ---

    #[test]
    fn links_resolved_and_deduped() {
        let html = r#"<html><body><main>
            <h1>Links</h1>
            <p>Intro paragraph.</p>
            <a href="/a">A</a>
            <a href="/b#section">B</a>
            <a href="/a">A again</a>
            <a href="https://other.com/page">Other</a>
        </main></body></html>"#;

        let doc = extract_html(html, "https://example.com/root").unwrap();
        assert_eq!(
            doc.outbound_links,
            vec![
                "https://example.com/a",
                "https://example.com/b",
                "https://other.com/page",
            ]
        );
    }

    #[test]
    fn links_skip_non_http_schemes() {
        let html = r##"<html><body><main>
            <h1>Links</h1>
            <p>Text.</p>
            <a href="#top">Top</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a href="ftp://example.com/file">FTP</a>
            <a href="/ok">OK</a>
        </main></body></html>"##;

        let doc = extract_html(html, "https://example.com/").unwrap();
        assert_eq!(doc.outbound_links, vec!["https://example.com/ok"]);
    }

    // --- Code block collection ---

    #[test]
    fn fenced_code_blocks_indexes_in_order() {
        let md = "Intro\n\n```rust\nfirst\n```\n\nMiddle\n\n```\nsecond\n```\n";
        let blocks = fenced_code_blocks(md);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, "first");
        assert_eq!(blocks[1].index, 1);
        assert_eq!(blocks[1].content, "second");
    }

    #[test]
    fn fenced_code_blocks_empty_on_plain_text() {
        assert!(fenced_code_blocks("no fences here").is_empty());
    }
}
