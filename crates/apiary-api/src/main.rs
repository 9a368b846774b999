use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use apiary_core::{Collator, ExcludePatterns};
use apiary_scraper::{Metrics, Scraper, Service};
use apiary_store::backend::DiskBackend;
use apiary_store::{Storage, Store};

use apiary_api::config::{self, AppConfig, StorageType};
use apiary_api::{app, scheduler, state, telemetry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let args = config::Args::parse();
    let cfg = config::load_config(&args.config_file)?;

    telemetry::init(&cfg.telemetry)?;

    let overlays = load_overlays(&args.overlay_file)?;
    let exclude = ExcludePatterns::new(&cfg.merging.exclude_patterns)?;
    let collator = Collator::new(overlays, exclude);

    let storage = open_storage(&cfg, collator).await?;
    let metrics = Arc::new(Metrics::new());

    let services: Vec<Service> = cfg
        .services
        .iter()
        .map(|s| Service {
            name: s.name.clone(),
            url: s.url.clone(),
        })
        .collect();
    let service_urls: Vec<String> = services.iter().map(|s| s.url.clone()).collect();
    let scraper = Scraper::new(services, storage.clone(), metrics.clone(), REQUEST_TIMEOUT)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(scheduler::run(
        scraper,
        storage.clone(),
        service_urls,
        args.scrape_interval,
        shutdown_rx,
    ));

    let app_state = state::AppState::new(cfg.clone(), storage, metrics);
    let router = app::build_router(app_state);

    let addr = cfg.listen_addr();
    info!(%addr, "starting apiary-api");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop scheduling and give the in-flight pass a bounded window.
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(args.graceful_timeout, scheduler)
        .await
        .is_err()
    {
        warn!("in-flight scrape did not finish within the graceful timeout");
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn load_overlays(paths: &[PathBuf]) -> Result<Vec<serde_json::Value>> {
    paths
        .iter()
        .map(|path| {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading overlay file {}", path.display()))?;
            serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing overlay file {}", path.display()))
        })
        .collect()
}

async fn open_storage(cfg: &AppConfig, collator: Collator) -> Result<Arc<dyn Storage>> {
    let store = match cfg.storage.storage_type {
        StorageType::Disk => {
            let backend = DiskBackend::open(&cfg.storage.disk.path)?;
            Store::open(Box::new(backend), collator).await?
        }
        StorageType::S3 => open_s3(cfg, collator).await?,
        StorageType::Gcs => anyhow::bail!("gcs storage is not supported"),
    };
    Ok(Arc::new(store))
}

#[cfg(feature = "s3")]
async fn open_s3(cfg: &AppConfig, collator: Collator) -> Result<Store> {
    use apiary_store::backend::{S3Backend, S3Options};

    let s3 = &cfg.storage.s3;
    let non_empty = |s: &String| (!s.is_empty()).then(|| s.clone());
    let backend = S3Backend::new(S3Options {
        bucket: cfg.storage.bucket_name.clone(),
        prefix: String::new(),
        region: non_empty(&s3.region),
        endpoint: non_empty(&s3.endpoint),
        access_key: non_empty(&s3.access_key),
        secret_key: non_empty(&s3.secret_key),
        session_token: non_empty(&s3.session_key),
        iam_role_enabled: cfg.storage.iam_role_enabled,
    })
    .await?;
    Ok(Store::open(Box::new(backend), collator).await?)
}

#[cfg(not(feature = "s3"))]
async fn open_s3(_cfg: &AppConfig, _collator: Collator) -> Result<Store> {
    anyhow::bail!("this build does not include s3 storage support")
}
