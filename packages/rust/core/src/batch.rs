//! Batch orchestration: validation, the bounded worker pool, crawl-session
//! bookkeeping, and async submission.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ingestkit_author::LlmClient;
use ingestkit_crawler::{CrawlSession, Fetcher, SessionState, normalize_url};
use ingestkit_shared::{
    AppConfig, BatchRequest, BatchResult, FetchError, IngestError, Result, SourceItem,
};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::pipeline::{self, PipelineContext, SourceOutcome};
use crate::response::BatchResponse;
use crate::webhook;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The batch engine. Cheap to clone; clones share the crawl-session registry.
#[derive(Clone)]
pub struct Engine {
    config: AppConfig,
    fetcher: Fetcher,
    llm: Option<LlmClient>,
    /// In-flight crawl sessions, keyed by normalized root URL.
    sessions: Arc<Mutex<HashMap<String, CrawlSession>>>,
}

impl Engine {
    pub fn new(config: AppConfig) -> Result<Self> {
        let fetcher = Fetcher::new(&config.pipeline)?;
        let llm = LlmClient::from_config(&config);
        Ok(Self {
            config,
            fetcher,
            llm,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Permit requests to localhost and private ranges.
    pub fn allow_localhost(mut self) -> Self {
        self.fetcher = self.fetcher.allow_localhost();
        self
    }

    /// Swap in an explicit LLM client, enabling the third author tier even
    /// when no credential is configured.
    pub fn with_llm_client(mut self, client: LlmClient) -> Self {
        self.llm = Some(client);
        self
    }

    // -----------------------------------------------------------------------
    // Synchronous submission
    // -----------------------------------------------------------------------

    /// Run a batch to completion and return the merged result.
    ///
    /// Item failures are logged into `processing_log` and dropped from
    /// `items`; only malformed requests and crawl-frontier violations fail
    /// the whole call.
    #[instrument(skip_all, fields(team_id = %request.team_id, urls = request.urls.len(), pdfs = request.pdfs.len(), depth = request.depth))]
    pub async fn run_batch(&self, request: BatchRequest) -> Result<BatchResult> {
        validate(&request)?;

        let ctx = Arc::new(PipelineContext {
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            llm: self.llm.clone(),
            author_mode: request.author_mode,
            user_id: request.user_id.clone(),
        });

        if request.depth > 0 {
            return self.run_crawl_pass(ctx, &request).await;
        }

        let work: Vec<SourceItem> = request
            .urls
            .iter()
            .cloned()
            .map(SourceItem::Url)
            .chain(request.pdfs.iter().cloned().map(SourceItem::Pdf))
            .collect();
        let outcomes = process_pool(ctx, work).await;

        let mut result = BatchResult {
            team_id: request.team_id,
            ..Default::default()
        };
        for (locator, outcome) in outcomes {
            merge_outcome(&mut result, &locator, outcome)?;
        }
        info!(
            items = result.items.len(),
            failures = result.processing_log.len(),
            "batch complete"
        );
        Ok(result)
    }

    /// State of the registered crawl session for `root`, if one is in
    /// flight. `None` once the session finishes and is dropped.
    pub fn session_state(&self, root: &str) -> Option<SessionState> {
        let key = session_key(root).ok()?;
        let sessions = self.sessions.lock().ok()?;
        sessions.get(&key).map(CrawlSession::state)
    }

    // -----------------------------------------------------------------------
    // Asynchronous submission
    // -----------------------------------------------------------------------

    /// Acknowledge immediately with a task id; the batch runs in the
    /// background and the finished envelope is POSTed to `webhook_url`.
    pub fn submit_async(&self, request: BatchRequest, webhook_url: String) -> Uuid {
        let task_id = Uuid::now_v7();
        let engine = self.clone();
        tokio::spawn(async move {
            let response = match engine.run_batch(request).await {
                Ok(result) => BatchResponse::success(result),
                Err(e) => BatchResponse::error(e.to_string()),
            };
            if let Err(e) = webhook::deliver(&webhook_url, &response, &engine.config.webhook).await
            {
                warn!(%task_id, error = %e, "webhook delivery abandoned");
            }
        });
        task_id
    }

    // -----------------------------------------------------------------------
    // Crawl passes
    // -----------------------------------------------------------------------

    /// Run exactly one depth pass of a crawl session.
    ///
    /// The first submission for a root creates the session and crawls depth
    /// 0; each continuation applies the caller's `exclude_urls` and crawls
    /// the next depth. The session stays registered between calls and is
    /// dropped once done.
    async fn run_crawl_pass(
        &self,
        ctx: Arc<PipelineContext>,
        request: &BatchRequest,
    ) -> Result<BatchResult> {
        let root = &request.urls[0];
        let key = session_key(root)?;

        let existing = {
            let mut sessions = lock_sessions(&self.sessions)?;
            sessions.remove(&key)
        };
        let mut session = match existing {
            Some(mut session) => {
                session.resume(&request.exclude_urls)?;
                session
            }
            None => CrawlSession::new(
                root,
                request.depth,
                &request.exclude_urls,
                self.config.crawl.depth_ceiling,
            )?,
        };

        let mut result = BatchResult {
            team_id: request.team_id.clone(),
            ..Default::default()
        };
        if session.is_done() {
            return Ok(result);
        }

        let frontier = session.begin_pass()?;
        let work: Vec<SourceItem> = frontier.into_iter().map(SourceItem::Url).collect();
        let outcomes = process_pool(ctx, work).await;

        for (url, outcome) in outcomes {
            match outcome {
                Ok(o) => {
                    let record = session.record_page(&url, &o.outbound_links)?;
                    result.crawl_records.push(record);
                    result.items.extend(o.items);
                    result.raw_trace.push(o.trace);
                }
                Err(e) if e.is_item_scoped() => {
                    result.processing_log.push(format!("{url}: {e}"));
                }
                Err(e) => return Err(e),
            }
        }

        let state = session.complete_pass()?;
        info!(?state, records = result.crawl_records.len(), "crawl pass complete");
        if !session.is_done() {
            lock_sessions(&self.sessions)?.insert(key, session);
        }
        Ok(result)
    }
}

fn session_key(root: &str) -> Result<String> {
    let url = Url::parse(root)
        .map_err(|e| IngestError::crawl(format!("invalid root url {root}: {e}")))?;
    Ok(normalize_url(&url))
}

fn lock_sessions<'a>(
    sessions: &'a Arc<Mutex<HashMap<String, CrawlSession>>>,
) -> Result<std::sync::MutexGuard<'a, HashMap<String, CrawlSession>>> {
    sessions
        .lock()
        .map_err(|_| IngestError::crawl("crawl session registry poisoned"))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(request: &BatchRequest) -> Result<()> {
    if request.team_id.trim().is_empty() {
        return Err(IngestError::validation("team_id is required"));
    }
    if request.urls.is_empty() && request.pdfs.is_empty() {
        return Err(IngestError::validation(
            "at least one url or pdf source is required",
        ));
    }
    if request.depth > 0 && (request.urls.len() != 1 || !request.pdfs.is_empty()) {
        return Err(IngestError::validation(
            "crawling requires exactly one root url and no pdf attachments",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// Process items concurrently under a bounded pool and a per-item timeout,
/// returning per-item results in submission order.
async fn process_pool(
    ctx: Arc<PipelineContext>,
    items: Vec<SourceItem>,
) -> Vec<(String, Result<SourceOutcome>)> {
    let semaphore = Arc::new(Semaphore::new(ctx.config.pipeline.concurrency));
    let item_timeout = Duration::from_secs(ctx.config.pipeline.item_timeout_secs);

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        let locator = item.locator().to_string();
        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Err(IngestError::config("worker pool closed")),
            };
            let work = async {
                match &item {
                    SourceItem::Url(url) => pipeline::process_url(&ctx, url).await,
                    SourceItem::Pdf(attachment) => pipeline::process_pdf(&ctx, attachment).await,
                }
            };
            match tokio::time::timeout(item_timeout, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(IngestError::Fetch(FetchError::Timeout(format!(
                    "item exceeded {}s budget",
                    item_timeout.as_secs()
                )))),
            }
        });
        handles.push((locator, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (locator, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(IngestError::config(format!("worker failed: {e}"))),
        };
        outcomes.push((locator, outcome));
    }
    outcomes
}

/// Fold one item's result into the batch: successes contribute items and a
/// trace entry, item-scoped failures a log line. Anything else aborts.
fn merge_outcome(
    result: &mut BatchResult,
    locator: &str,
    outcome: Result<SourceOutcome>,
) -> Result<()> {
    match outcome {
        Ok(o) => {
            result.items.extend(o.items);
            result.raw_trace.push(o.trace);
        }
        Err(e) if e.is_item_scoped() => {
            warn!(locator, error = %e, "item dropped");
            result.processing_log.push(format!("{locator}: {e}"));
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
