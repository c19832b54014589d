//! Batch orchestration over the ingestkit pipeline crates.
//!
//! [`Engine`] accepts heterogeneous batches of URLs and PDF attachments,
//! fans them through fetch, extract, chunk, tag, and author resolution under
//! a bounded worker pool, and merges everything into a [`BatchResult`].
//! Crawl sessions and webhook-backed async submission live here too.
//!
//! [`BatchResult`]: ingestkit_shared::BatchResult

mod batch;
mod pipeline;
mod response;
mod webhook;

pub use batch::Engine;
pub use response::{BatchResponse, ProcessedOutput, ResponseStatus};
pub use webhook::deliver;
