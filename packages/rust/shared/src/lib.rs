//! Shared types, errors, and configuration for ingestkit.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AppConfig, ChunkConfig, CrawlLimitsConfig, LlmConfig, PdfConfig, PipelineConfig,
    WebhookConfig, config_file_path, init_config, llm_api_key, load_config, load_config_from,
};
pub use error::{FetchError, IngestError, Result};
pub use types::{
    AuthorMode, BatchRequest, BatchResult, Chunk, CodeBlock, ContentType, CrawlRecord,
    ExtractedDocument, OutputItem, PdfAttachment, READING_SPEED_WPM, SourceItem, SourceKind,
    SourceTrace,
};
