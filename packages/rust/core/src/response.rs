//! External response envelope wrapped around a finished batch.

use ingestkit_shared::{BatchResult, CrawlRecord, OutputItem, SourceTrace};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The caller-facing slice of a batch: team id plus output items, without
/// diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedOutput {
    pub team_id: String,
    pub items: Vec<OutputItem>,
}

/// Envelope delivered to callers and webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_output: Option<ProcessedOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_output: Vec<SourceTrace>,
    /// Crawl records, present only when a crawl occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<CrawlRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processing_log: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchResponse {
    pub fn success(result: BatchResult) -> Self {
        Self {
            status: ResponseStatus::Success,
            processed_output: Some(ProcessedOutput {
                team_id: result.team_id,
                items: result.items,
            }),
            raw_output: result.raw_trace,
            urls: result.crawl_records,
            processing_log: result.processing_log,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            processed_output: None,
            raw_output: Vec::new(),
            urls: Vec::new(),
            processing_log: Vec::new(),
            message: Some(message.into()),
        }
    }
}
