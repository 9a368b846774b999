//! In-process scrape and request metrics, rendered in Prometheus text
//! exposition format.
//!
//! Request durations are recorded only for the OpenAPI surface paths
//! (`/openapi` and `/openapi/<version>`) so that arbitrary upstream redirects
//! do not pollute the label space.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::RwLock;
use regex::Regex;
use reqwest::{Method, StatusCode, Url};

fn openapi_path() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/openapi(/\d{4}-\d{2}-\d{2}(~\w+)?)?$").expect("path regex"))
}

#[derive(Debug, Default, Clone)]
struct ScrapeStats {
    runs: u64,
    errors: u64,
    total_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct RequestKey {
    host: String,
    method: String,
    status_class: String,
}

#[derive(Debug, Default, Clone)]
struct RequestStats {
    count: u64,
    total_seconds: f64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    scrapes: RwLock<BTreeMap<String, ScrapeStats>>,
    requests: RwLock<BTreeMap<RequestKey, RequestStats>>,
    runs: RwLock<ScrapeStats>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one whole scrape run.
    pub fn observe_run(&self, elapsed: Duration, failed: bool) {
        let mut runs = self.runs.write();
        runs.runs += 1;
        runs.errors += u64::from(failed);
        runs.total_seconds += elapsed.as_secs_f64();
    }

    /// Record one per-service scrape.
    pub fn observe_scrape(&self, service: &str, elapsed: Duration, failed: bool) {
        let mut scrapes = self.scrapes.write();
        let stats = scrapes.entry(service.to_string()).or_default();
        stats.runs += 1;
        stats.errors += u64::from(failed);
        stats.total_seconds += elapsed.as_secs_f64();
    }

    /// Record one outbound request, labelled by host, method, and status
    /// class. Non-OpenAPI paths are ignored.
    pub fn observe_request(
        &self,
        url: &str,
        method: &Method,
        status: Option<StatusCode>,
        elapsed: Duration,
    ) {
        let Ok(parsed) = Url::parse(url) else { return };
        if !openapi_path().is_match(parsed.path()) {
            return;
        }
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return,
        };
        let status_class = match status {
            Some(s) => format!("{}xx", s.as_u16() / 100),
            None => "error".to_string(),
        };
        let key = RequestKey {
            host,
            method: method.as_str().to_string(),
            status_class,
        };
        let mut requests = self.requests.write();
        let stats = requests.entry(key).or_default();
        stats.count += 1;
        stats.total_seconds += elapsed.as_secs_f64();
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let runs = self.runs.read().clone();
        out.push_str("# TYPE apiary_scrape_runs_total counter\n");
        let _ = writeln!(out, "apiary_scrape_runs_total {}", runs.runs);
        out.push_str("# TYPE apiary_scrape_run_failures_total counter\n");
        let _ = writeln!(out, "apiary_scrape_run_failures_total {}", runs.errors);

        out.push_str("# TYPE apiary_service_scrapes_total counter\n");
        out.push_str("# TYPE apiary_service_scrape_errors_total counter\n");
        out.push_str("# TYPE apiary_service_scrape_duration_seconds_sum counter\n");
        for (service, stats) in self.scrapes.read().iter() {
            let _ = writeln!(
                out,
                "apiary_service_scrapes_total{{service=\"{service}\"}} {}",
                stats.runs
            );
            let _ = writeln!(
                out,
                "apiary_service_scrape_errors_total{{service=\"{service}\"}} {}",
                stats.errors
            );
            let _ = writeln!(
                out,
                "apiary_service_scrape_duration_seconds_sum{{service=\"{service}\"}} {}",
                stats.total_seconds
            );
        }

        out.push_str("# TYPE apiary_request_duration_seconds_count counter\n");
        out.push_str("# TYPE apiary_request_duration_seconds_sum counter\n");
        for (key, stats) in self.requests.read().iter() {
            let labels = format!(
                "host=\"{}\",method=\"{}\",status=\"{}\"",
                key.host, key.method, key.status_class
            );
            let _ = writeln!(
                out,
                "apiary_request_duration_seconds_count{{{labels}}} {}",
                stats.count
            );
            let _ = writeln!(
                out,
                "apiary_request_duration_seconds_sum{{{labels}}} {}",
                stats.total_seconds
            );
        }

        out
    }
}
