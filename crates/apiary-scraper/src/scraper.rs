//! Per-service scrape loop with digest-keyed deduplication.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{header, Method, Response, StatusCode};
use time::OffsetDateTime;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use apiary_core::digest::parse_digest_header;
use apiary_core::{Version, VersionError};
use apiary_store::{Storage, StoreError};

use crate::metrics::Metrics;

/// One upstream service to scrape.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub url: String,
}

/// A failure within one service's scrape. Any of these fails that service's
/// scrape; other services are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("request {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },

    #[error("{url}: unexpected status {status}")]
    Status { url: String, status: StatusCode },

    #[error("{url}: unexpected content type {content_type:?}")]
    ContentType { url: String, content_type: String },

    #[error("{url}: malformed body: {reason}")]
    Malformed { url: String, reason: String },

    #[error("{url}: {source}")]
    Version { url: String, source: VersionError },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Accumulated failures from one scrape run. Successful services' revisions
/// are kept even when others fail.
#[derive(Debug)]
pub struct RunError {
    pub failures: Vec<(String, ScrapeError)>,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scrape failed for {} service(s):", self.failures.len())?;
        for (service, err) in &self.failures {
            write!(f, " [{service}: {err}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for RunError {}

#[derive(Clone)]
pub struct Scraper {
    client: reqwest::Client,
    services: Vec<Service>,
    storage: Arc<dyn Storage>,
    metrics: Arc<Metrics>,
}

impl Scraper {
    /// Build a scraper. `request_timeout` applies to every outbound call.
    pub fn new(
        services: Vec<Service>,
        storage: Arc<dyn Storage>,
        metrics: Arc<Metrics>,
        request_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            services,
            storage,
            metrics,
        })
    }

    /// Run one scrape pass: one concurrent task per service, sequential
    /// per-version fetches within a service. The scrape time is captured
    /// once so every revision from this run carries the same timestamp.
    ///
    /// Cancellation is by dropping the returned future; in-flight requests
    /// are aborted with it.
    pub async fn run(&self) -> Result<(), RunError> {
        let run_started = Instant::now();
        let scrape_time = OffsetDateTime::now_utc();

        let mut tasks = JoinSet::new();
        for service in &self.services {
            let scraper = self.clone();
            let service = service.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let result = scraper.scrape_service(&service, scrape_time).await;
                scraper
                    .metrics
                    .observe_scrape(&service.name, started.elapsed(), result.is_err());
                (service.name, result)
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((service, Err(err))) => {
                    warn!(service = %service, error = %err, "service scrape failed");
                    failures.push((service, err));
                }
                Err(join_err) if join_err.is_panic() => {
                    std::panic::resume_unwind(join_err.into_panic())
                }
                Err(_) => {}
            }
        }

        self.metrics
            .observe_run(run_started.elapsed(), !failures.is_empty());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RunError { failures })
        }
    }

    async fn scrape_service(
        &self,
        service: &Service,
        scrape_time: OffsetDateTime,
    ) -> Result<(), ScrapeError> {
        let base = service.url.trim_end_matches('/');
        let list_url = format!("{base}/openapi");

        let response = self.request(Method::GET, &list_url).await?;
        require_ok(&list_url, &response)?;
        require_json(&list_url, &response)?;
        let bytes = body_bytes(&list_url, response).await?;
        let versions: Vec<String> =
            serde_json::from_slice(&bytes).map_err(|e| ScrapeError::Malformed {
                url: list_url.clone(),
                reason: e.to_string(),
            })?;
        debug!(service = %service.name, count = versions.len(), "advertised versions");

        self.storage
            .notify_versions(&service.url, &versions, scrape_time)
            .await?;

        for raw in &versions {
            let version = Version::parse(raw).map_err(|source| ScrapeError::Version {
                url: list_url.clone(),
                source,
            })?;
            self.scrape_version(service, raw, &version, scrape_time)
                .await?;
        }
        Ok(())
    }

    async fn scrape_version(
        &self,
        service: &Service,
        raw: &str,
        version: &Version,
        scrape_time: OffsetDateTime,
    ) -> Result<(), ScrapeError> {
        let base = service.url.trim_end_matches('/');
        let url = format!("{base}/openapi/{raw}");

        // A HEAD carrying a digest we already hold lets us skip the GET.
        let head = self.request(Method::HEAD, &url).await?;
        if head.status() == StatusCode::METHOD_NOT_ALLOWED {
            // Upstream does not implement HEAD; fall through to GET.
        } else if head.status().is_success() {
            let advertised = head
                .headers()
                .get("digest")
                .and_then(|h| h.to_str().ok())
                .and_then(parse_digest_header);
            if let Some(digest) = advertised {
                if self
                    .storage
                    .has_version(&service.url, version, &digest)
                    .await?
                {
                    debug!(service = %service.name, version = %raw, "revision unchanged, skipping fetch");
                    return Ok(());
                }
            }
        } else {
            return Err(ScrapeError::Status {
                url,
                status: head.status(),
            });
        }

        let response = self.request(Method::GET, &url).await?;
        require_ok(&url, &response)?;
        require_json(&url, &response)?;
        let bytes = body_bytes(&url, response).await?;

        let document: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| ScrapeError::Malformed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        if !document.is_object() {
            return Err(ScrapeError::Malformed {
                url,
                reason: "expected a JSON object".to_string(),
            });
        }

        self.storage
            .notify_version(&service.url, version, &bytes, scrape_time)
            .await?;
        Ok(())
    }

    async fn request(&self, method: Method, url: &str) -> Result<Response, ScrapeError> {
        let started = Instant::now();
        let result = self.client.request(method.clone(), url).send().await;
        let status = result.as_ref().ok().map(|r| r.status());
        self.metrics
            .observe_request(url, &method, status, started.elapsed());
        result.map_err(|source| ScrapeError::Transport {
            url: url.to_string(),
            source,
        })
    }
}

fn require_ok(url: &str, response: &Response) -> Result<(), ScrapeError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(ScrapeError::Status {
            url: url.to_string(),
            status: response.status(),
        })
    }
}

fn require_json(url: &str, response: &Response) -> Result<(), ScrapeError> {
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
        .to_string();
    if content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
    {
        Ok(())
    } else {
        Err(ScrapeError::ContentType {
            url: url.to_string(),
            content_type,
        })
    }
}

async fn body_bytes(url: &str, response: Response) -> Result<Vec<u8>, ScrapeError> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|source| ScrapeError::Transport {
            url: url.to_string(),
            source,
        })
}
