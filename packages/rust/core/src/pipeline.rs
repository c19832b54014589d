//! Per-item processing: fetch, extract, chunk, tag, resolve author, and
//! assemble the output records for one source.

use ingestkit_author::{LlmClient, reading_time_minutes, resolve_author, word_count};
use ingestkit_chunker::{chunk_markdown, tags::assign_tags};
use ingestkit_crawler::{FetchedPayload, Fetcher};
use ingestkit_extract::{extract_html, fenced_code_blocks};
use ingestkit_pdf::extract_pdf;
use ingestkit_shared::{
    AppConfig, AuthorMode, Chunk, ContentType, ExtractedDocument, OutputItem, PdfAttachment,
    Result, SourceKind, SourceTrace,
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// Longest first-body-line fragment used as a fallback item title.
const TITLE_FALLBACK_CHARS: usize = 80;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a worker needs to process one source item. Built once per batch
/// and shared read-only across workers.
pub(crate) struct PipelineContext {
    pub config: AppConfig,
    pub fetcher: Fetcher,
    pub llm: Option<LlmClient>,
    pub author_mode: AuthorMode,
    pub user_id: String,
}

/// Everything one source item produced.
pub(crate) struct SourceOutcome {
    pub items: Vec<OutputItem>,
    pub trace: SourceTrace,
    /// Absolute outbound links, for the crawl frontier.
    pub outbound_links: Vec<String>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Fetch a URL and run the full pipeline on whatever it serves. A URL that
/// responds with PDF bytes goes down the PDF path with the URL as filename.
#[instrument(skip(ctx), fields(url = %url))]
pub(crate) async fn process_url(ctx: &PipelineContext, url: &str) -> Result<SourceOutcome> {
    let payload = ctx.fetcher.fetch(url).await?;
    let doc = match payload {
        FetchedPayload::Html(html) => extract_html(&html, url)?,
        FetchedPayload::Pdf(bytes) => extract_pdf(&bytes, url, &ctx.config.pdf)?,
    };
    finish_document(ctx, doc).await
}

/// Run the full pipeline on an uploaded PDF attachment.
#[instrument(skip(ctx, attachment), fields(filename = %attachment.filename))]
pub(crate) async fn process_pdf(
    ctx: &PipelineContext,
    attachment: &PdfAttachment,
) -> Result<SourceOutcome> {
    let doc = extract_pdf(&attachment.bytes, &attachment.filename, &ctx.config.pdf)?;
    finish_document(ctx, doc).await
}

// ---------------------------------------------------------------------------
// Shared tail: chunk, tag, resolve, assemble
// ---------------------------------------------------------------------------

async fn finish_document(ctx: &PipelineContext, doc: ExtractedDocument) -> Result<SourceOutcome> {
    let mut chunks = chunk_markdown(&doc.markdown_body, &ctx.config.chunking);
    assign_tags(&mut chunks, ctx.config.chunking.top_k_tags);

    let resolution = resolve_author(&doc, ctx.author_mode, ctx.llm.as_ref()).await;
    let (author, author_method) = match resolution {
        Some(r) => (r.author, Some(r.method.to_string())),
        None => (String::new(), None),
    };

    let content_type = classify(&doc);
    debug!(
        url = %doc.source_url,
        chunks = chunks.len(),
        %content_type,
        "document processed"
    );

    let items = chunks
        .iter()
        .map(|chunk| OutputItem {
            title: item_title(chunk, &doc),
            content: chunk.to_markdown(),
            content_type,
            source_url: doc.source_url.clone(),
            author: author.clone(),
            author_method: author_method.clone(),
            user_id: ctx.user_id.clone(),
        })
        .collect();

    let trace = build_trace(&doc, &chunks);
    let outbound_links = doc.outbound_links;
    Ok(SourceOutcome {
        items,
        trace,
        outbound_links,
    })
}

/// Document-level classification. PDFs are books, web pages are blog posts,
/// anything else falls through to other.
fn classify(doc: &ExtractedDocument) -> ContentType {
    match doc.source_kind {
        SourceKind::Pdf => ContentType::Book,
        SourceKind::Url
            if doc.source_url.starts_with("http://") || doc.source_url.starts_with("https://") =>
        {
            ContentType::Blog
        }
        SourceKind::Url => ContentType::Other,
    }
}

/// Item title precedence: chunk heading, then document title, then the first
/// non-empty body line truncated on a char boundary.
fn item_title(chunk: &Chunk, doc: &ExtractedDocument) -> String {
    if let Some(heading) = &chunk.heading {
        return heading.clone();
    }
    if !doc.title.trim().is_empty() {
        return doc.title.clone();
    }
    let first_line = chunk
        .body
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Untitled");
    truncate_chars(first_line, TITLE_FALLBACK_CHARS).to_string()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn build_trace(doc: &ExtractedDocument, chunks: &[Chunk]) -> SourceTrace {
    // Word count and tags come from the final chunk set, not the raw body.
    let rendered: Vec<String> = chunks.iter().map(Chunk::to_markdown).collect();
    let final_text = rendered.join("\n\n");
    let words = word_count(&final_text);

    let mut tags = Vec::new();
    for chunk in chunks {
        for tag in &chunk.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(doc.markdown_body.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    SourceTrace {
        source_url: doc.source_url.clone(),
        title: doc.title.clone(),
        markdown: doc.markdown_body.clone(),
        raw_metadata: doc.raw_metadata.clone(),
        code_blocks: fenced_code_blocks(&doc.markdown_body),
        word_count: words,
        reading_time_minutes: reading_time_minutes(words),
        tags,
        content_hash,
    }
}
