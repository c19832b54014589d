//! Transport layer: fetches raw bytes for a URL and classifies the payload.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use ingestkit_shared::{FetchError, IngestError, PipelineConfig, Result};

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("ingestkit/", env!("CARGO_PKG_VERSION"));

/// A fetched payload, classified by media type.
#[derive(Debug, Clone)]
pub enum FetchedPayload {
    Html(String),
    Pdf(Vec<u8>),
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher with bounded timeout, bounded payload size, and media-type
/// gating. Retry policy lives in the orchestrator, never here.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_bytes: usize,
    /// Allow localhost/private IPs (for tests against mock servers).
    allow_localhost: bool,
}

impl Fetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| IngestError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_bytes: config.max_fetch_bytes,
            allow_localhost: false,
        })
    }

    /// Permit requests to localhost and private ranges.
    pub fn allow_localhost(mut self) -> Self {
        self.allow_localhost = true;
        self
    }

    /// Fetch a URL and classify the response as HTML or PDF.
    ///
    /// Oversized payloads and media types that are neither text nor PDF fail
    /// with [`FetchError::UnsupportedMedia`].
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedPayload> {
        let parsed = Url::parse(url)
            .map_err(|e| FetchError::Unreachable(format!("{url}: invalid url: {e}")))?;

        if !self.allow_localhost && is_ssrf_target(&parsed) {
            warn!(%url, "blocked: private or non-http target");
            return Err(FetchError::Unreachable(format!("{url}: blocked target")).into());
        }

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(FetchError::UnsupportedMedia {
                    url: url.to_string(),
                    reason: format!("payload of {len} bytes exceeds limit"),
                }
                .into());
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport_error(url, &e))?;

        if bytes.len() > self.max_bytes {
            return Err(FetchError::UnsupportedMedia {
                url: url.to_string(),
                reason: format!("payload of {} bytes exceeds limit", bytes.len()),
            }
            .into());
        }

        debug!(len = bytes.len(), content_type = %content_type, "fetched");

        if content_type.starts_with("application/pdf") || bytes.starts_with(b"%PDF-") {
            return Ok(FetchedPayload::Pdf(bytes.to_vec()));
        }

        if content_type.starts_with("text/")
            || content_type.starts_with("application/xhtml")
            || content_type.is_empty()
        {
            return Ok(FetchedPayload::Html(
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }

        Err(FetchError::UnsupportedMedia {
            url: url.to_string(),
            reason: format!("unsupported content type {content_type}"),
        }
        .into())
    }
}

fn classify_transport_error(url: &str, e: &reqwest::Error) -> IngestError {
    if e.is_timeout() {
        FetchError::Timeout(format!("{url}: {e}")).into()
    } else {
        FetchError::Unreachable(format!("{url}: {e}")).into()
    }
}

// ---------------------------------------------------------------------------
// URL normalization
// ---------------------------------------------------------------------------

/// Normalize a URL for seen-set membership: strip the fragment and any
/// trailing slash on non-root paths.
pub fn normalize_url(url: &Url) -> String {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    let mut s = normalized.to_string();
    if s.ends_with('/') && s.matches('/').count() > 3 {
        s.pop();
    }
    s
}

// ---------------------------------------------------------------------------
// Request target guard
// ---------------------------------------------------------------------------

/// Reject non-http schemes and private or loopback hosts.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
