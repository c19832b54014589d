//! Depth-bounded crawl frontier with a global seen-set.
//!
//! One session per root URL. Each depth is crawled as a pass: the caller
//! takes the pass's frontier, fetches and extracts each page, and feeds the
//! outbound links back through [`CrawlSession::record_page`]. Between passes
//! the session parks in `AwaitingContinuation` so the caller can exclude
//! discovered URLs before the next depth.

use std::collections::HashSet;

use tracing::debug;
use url::Url;

use ingestkit_shared::{CrawlRecord, IngestError, Result};

use crate::fetch::normalize_url;

/// Lifecycle of a crawl session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Crawling(u32),
    AwaitingContinuation(u32),
    Done,
}

/// A single-root crawl session.
///
/// The seen-set is global to the session: a URL that has ever been queued or
/// excluded is never queued again, even if rediscovered at a later depth.
#[derive(Debug)]
pub struct CrawlSession {
    root: String,
    max_depth: u32,
    state: SessionState,
    seen: HashSet<String>,
    next: Vec<String>,
}

impl CrawlSession {
    /// Start a session at `root_url`, bounded by `max_depth`.
    ///
    /// `exclude_urls` are pre-seeded into the seen-set so they can never be
    /// queued. Fails when `max_depth` exceeds `depth_ceiling`.
    pub fn new(
        root_url: &str,
        max_depth: u32,
        exclude_urls: &[String],
        depth_ceiling: u32,
    ) -> Result<Self> {
        if max_depth > depth_ceiling {
            return Err(IngestError::crawl(format!(
                "requested depth {max_depth} exceeds ceiling {depth_ceiling}"
            )));
        }

        let root = Url::parse(root_url)
            .map_err(|e| IngestError::crawl(format!("invalid root url {root_url}: {e}")))?;
        let root_normalized = normalize_url(&root);

        let mut seen = HashSet::new();
        for excluded in exclude_urls {
            if let Ok(url) = Url::parse(excluded) {
                seen.insert(normalize_url(&url));
            }
        }
        seen.insert(root_normalized);

        Ok(Self {
            root: root.to_string(),
            max_depth,
            state: SessionState::Idle,
            seen,
            next: vec![root.to_string()],
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }

    /// Begin the next pass, returning the frontier to fetch.
    ///
    /// Transitions `Idle -> Crawling(0)` or
    /// `AwaitingContinuation(d) -> Crawling(d+1)`. An empty frontier moves
    /// straight to `Done` and returns no URLs.
    pub fn begin_pass(&mut self) -> Result<Vec<String>> {
        let depth = match self.state {
            SessionState::Idle => 0,
            SessionState::AwaitingContinuation(depth) => depth + 1,
            SessionState::Crawling(_) => {
                return Err(IngestError::crawl("pass already in progress"));
            }
            SessionState::Done => {
                return Err(IngestError::crawl("session is finished"));
            }
        };

        if self.next.is_empty() {
            self.state = SessionState::Done;
            return Ok(Vec::new());
        }

        let frontier = std::mem::take(&mut self.next);
        self.state = SessionState::Crawling(depth);
        debug!(depth, frontier = frontier.len(), "beginning crawl pass");
        Ok(frontier)
    }

    /// Record one fetched page's outbound links.
    ///
    /// Links never seen before are marked seen and queued for the next depth
    /// in one step; only those appear in the returned record's `found_urls`.
    pub fn record_page(&mut self, page_url: &str, outbound_links: &[String]) -> Result<CrawlRecord> {
        let SessionState::Crawling(depth) = self.state else {
            return Err(IngestError::crawl("no pass in progress"));
        };

        let queue_more = depth < self.max_depth;
        let mut found_urls = Vec::new();

        for link in outbound_links {
            let Ok(url) = Url::parse(link) else {
                continue;
            };
            if self.seen.insert(normalize_url(&url)) {
                found_urls.push(link.clone());
                if queue_more {
                    self.next.push(link.clone());
                }
            }
        }

        Ok(CrawlRecord {
            original_url: page_url.to_string(),
            depth_level: depth,
            found_urls,
        })
    }

    /// Finish the current pass.
    ///
    /// Moves to `AwaitingContinuation` when another depth remains and the
    /// next frontier is non-empty, otherwise to `Done`.
    pub fn complete_pass(&mut self) -> Result<SessionState> {
        let SessionState::Crawling(depth) = self.state else {
            return Err(IngestError::crawl("no pass in progress"));
        };

        self.state = if depth >= self.max_depth || self.next.is_empty() {
            SessionState::Done
        } else {
            SessionState::AwaitingContinuation(depth)
        };
        Ok(self.state)
    }

    /// Apply caller exclusions before the next pass.
    ///
    /// Excluded URLs are dropped from the pending frontier; they stay in the
    /// seen-set, so they can never reappear. An emptied frontier finishes
    /// the session.
    pub fn resume(&mut self, exclude_urls: &[String]) -> Result<()> {
        if !matches!(self.state, SessionState::AwaitingContinuation(_)) {
            return Err(IngestError::crawl("session is not awaiting continuation"));
        }

        let excluded: HashSet<String> = exclude_urls
            .iter()
            .filter_map(|u| Url::parse(u).ok())
            .map(|u| normalize_url(&u))
            .collect();

        self.seen.extend(excluded.iter().cloned());
        self.next.retain(|url| {
            Url::parse(url)
                .map(|u| !excluded.contains(&normalize_url(&u)))
                .unwrap_or(false)
        });

        if self.next.is_empty() {
            self.state = SessionState::Done;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://example.com/start";

    fn links(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn depth_over_ceiling_is_rejected() {
        let err = CrawlSession::new(ROOT, 4, &[], 3).unwrap_err();
        assert!(matches!(err, IngestError::Crawl { .. }));
    }

    #[test]
    fn invalid_root_is_rejected() {
        assert!(CrawlSession::new("not a url", 1, &[], 3).is_err());
    }

    #[test]
    fn depth_zero_crawls_only_root() {
        let mut session = CrawlSession::new(ROOT, 0, &[], 3).unwrap();
        assert_eq!(session.state(), SessionState::Idle);

        let frontier = session.begin_pass().unwrap();
        assert_eq!(frontier, vec![ROOT.to_string()]);
        assert_eq!(session.state(), SessionState::Crawling(0));

        let record = session
            .record_page(ROOT, &links(&["https://example.com/a"]))
            .unwrap();
        // Discovered but not queued at the final depth
        assert_eq!(record.found_urls, links(&["https://example.com/a"]));
        assert_eq!(record.depth_level, 0);

        assert_eq!(session.complete_pass().unwrap(), SessionState::Done);
    }

    #[test]
    fn rediscovered_url_never_requeued() {
        let mut session = CrawlSession::new(ROOT, 2, &[], 3).unwrap();

        session.begin_pass().unwrap();
        let r0 = session
            .record_page(ROOT, &links(&["https://example.com/a", "https://example.com/b"]))
            .unwrap();
        assert_eq!(r0.found_urls.len(), 2);
        session.complete_pass().unwrap();
        session.resume(&[]).unwrap();

        let frontier = session.begin_pass().unwrap();
        assert_eq!(frontier.len(), 2);

        // Page a links back to b and the root; both already seen
        let r1 = session
            .record_page(
                "https://example.com/a",
                &links(&["https://example.com/b", ROOT, "https://example.com/c"]),
            )
            .unwrap();
        assert_eq!(r1.found_urls, links(&["https://example.com/c"]));
        assert_eq!(r1.depth_level, 1);
    }

    #[test]
    fn excluded_urls_never_queued() {
        let exclude = links(&["https://example.com/skip"]);
        let mut session = CrawlSession::new(ROOT, 1, &exclude, 3).unwrap();

        session.begin_pass().unwrap();
        let record = session
            .record_page(ROOT, &links(&["https://example.com/skip", "https://example.com/keep"]))
            .unwrap();
        assert_eq!(record.found_urls, links(&["https://example.com/keep"]));
    }

    #[test]
    fn resume_drops_excluded_from_frontier() {
        let mut session = CrawlSession::new(ROOT, 1, &[], 3).unwrap();

        session.begin_pass().unwrap();
        session
            .record_page(ROOT, &links(&["https://example.com/a", "https://example.com/b"]))
            .unwrap();
        assert_eq!(
            session.complete_pass().unwrap(),
            SessionState::AwaitingContinuation(0)
        );

        session.resume(&links(&["https://example.com/a"])).unwrap();
        let frontier = session.begin_pass().unwrap();
        assert_eq!(frontier, links(&["https://example.com/b"]));
    }

    #[test]
    fn resume_excluding_everything_finishes() {
        let mut session = CrawlSession::new(ROOT, 1, &[], 3).unwrap();

        session.begin_pass().unwrap();
        session
            .record_page(ROOT, &links(&["https://example.com/only"]))
            .unwrap();
        session.complete_pass().unwrap();

        session.resume(&links(&["https://example.com/only"])).unwrap();
        assert!(session.is_done());
    }

    #[test]
    fn no_discoveries_finishes_after_pass() {
        let mut session = CrawlSession::new(ROOT, 2, &[], 3).unwrap();
        session.begin_pass().unwrap();
        session.record_page(ROOT, &[]).unwrap();
        assert_eq!(session.complete_pass().unwrap(), SessionState::Done);
    }

    #[test]
    fn record_outside_pass_is_error() {
        let mut session = CrawlSession::new(ROOT, 1, &[], 3).unwrap();
        assert!(session.record_page(ROOT, &[]).is_err());
    }

    #[test]
    fn fragments_do_not_defeat_dedup() {
        let mut session = CrawlSession::new(ROOT, 1, &[], 3).unwrap();
        session.begin_pass().unwrap();
        let record = session
            .record_page(
                ROOT,
                &links(&["https://example.com/a#one", "https://example.com/a#two"]),
            )
            .unwrap();
        assert_eq!(record.found_urls.len(), 1);
    }
}
