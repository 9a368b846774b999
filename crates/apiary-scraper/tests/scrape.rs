//! Scraper behavior against real HTTP upstreams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, on, MethodFilter};
use axum::{Json, Router};
use serde_json::{json, Value};

use apiary_core::digest::digest;
use apiary_core::{Collator, Version};
use apiary_scraper::{Metrics, Scraper, Service};
use apiary_store::{Storage, Store};
use time::OffsetDateTime;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn upstream(specs: &[(&str, Value)]) -> Router {
    let order: Vec<String> = specs.iter().map(|(v, _)| v.to_string()).collect();
    let docs: Arc<HashMap<String, Value>> = Arc::new(
        specs
            .iter()
            .map(|(v, doc)| (v.to_string(), doc.clone()))
            .collect(),
    );
    Router::new()
        .route(
            "/openapi",
            get(move || {
                let order = order.clone();
                async move { Json(order) }
            }),
        )
        .route(
            "/openapi/:version",
            get(move |Path(version): Path<String>| {
                let docs = docs.clone();
                async move {
                    match docs.get(&version) {
                        Some(doc) => Json(doc.clone()).into_response(),
                        None => StatusCode::NOT_FOUND.into_response(),
                    }
                }
            }),
        )
}

fn scraper_for(services: Vec<Service>, storage: Arc<dyn Storage>) -> Scraper {
    Scraper::new(
        services,
        storage,
        Arc::new(Metrics::new()),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn scrapes_and_collates_two_services() {
    let petfood = serve(upstream(&[
        ("2021-09-01", json!({"paths": {"/crickets": {}}})),
        ("2021-09-16", json!({"paths": {"/crickets": {}, "/kibble": {}}})),
    ]))
    .await;
    let animals = serve(upstream(&[
        ("2021-10-01", json!({"paths": {"/geckos": {}}})),
        ("2021-10-16", json!({"paths": {"/geckos": {}, "/puppies": {}}})),
    ]))
    .await;

    let storage: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    let services = vec![
        Service { name: "petfood".into(), url: petfood.clone() },
        Service { name: "animals".into(), url: animals.clone() },
    ];
    let scraper = scraper_for(services, storage.clone());

    scraper.run().await.unwrap();
    storage.collate_versions(&[petfood, animals]).await.unwrap();

    assert_eq!(
        storage.versions().await.unwrap(),
        vec!["2021-09-01", "2021-09-16", "2021-10-01", "2021-10-16"]
    );
    for (version, expected_paths) in [
        ("2021-09-01", 1),
        ("2021-09-16", 2),
        ("2021-10-01", 3),
        ("2021-10-16", 4),
    ] {
        let doc: Value =
            serde_json::from_slice(&storage.version(version).await.unwrap()).unwrap();
        assert_eq!(
            doc["paths"].as_object().unwrap().len(),
            expected_paths,
            "paths at {version}"
        );
    }
}

#[tokio::test]
async fn empty_service_list_succeeds() {
    let storage: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    let scraper = scraper_for(Vec::new(), storage.clone());
    scraper.run().await.unwrap();
    storage.collate_versions(&[]).await.unwrap();
    assert!(storage.versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn service_with_no_versions_adds_nothing() {
    let url = serve(upstream(&[])).await;
    let storage: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    let scraper = scraper_for(
        vec![Service { name: "empty".into(), url: url.clone() }],
        storage.clone(),
    );
    scraper.run().await.unwrap();
    storage.collate_versions(&[url]).await.unwrap();
    assert!(storage.versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn one_failing_service_does_not_discard_the_other() {
    let good = serve(upstream(&[("2021-09-01", json!({"paths": {"/ok": {}}}))])).await;
    // Wrong content type on the version list.
    let bad = serve(Router::new().route("/openapi", get(|| async { "not json" }))).await;

    let storage: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    let scraper = scraper_for(
        vec![
            Service { name: "good".into(), url: good.clone() },
            Service { name: "bad".into(), url: bad },
        ],
        storage.clone(),
    );

    let err = scraper.run().await.unwrap_err();
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, "bad");

    storage.collate_versions(&[good]).await.unwrap();
    assert_eq!(storage.versions().await.unwrap(), vec!["2021-09-01"]);
}

#[tokio::test]
async fn head_405_falls_through_to_get() {
    // GET-only method router: HEAD gets a 405.
    let router = Router::new()
        .route(
            "/openapi",
            on(MethodFilter::GET, || async { Json(json!(["2021-09-01"])) }),
        )
        .route(
            "/openapi/:version",
            on(MethodFilter::GET, || async { Json(json!({"paths": {"/x": {}}})) }),
        );
    let url = serve(router).await;

    let storage: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    let scraper = scraper_for(
        vec![Service { name: "svc".into(), url: url.clone() }],
        storage.clone(),
    );
    scraper.run().await.unwrap();

    let body = serde_json::to_vec(&json!({"paths": {"/x": {}}})).unwrap();
    assert!(storage
        .has_version(&url, &Version::parse("2021-09-01").unwrap(), &digest(&body))
        .await
        .unwrap());
}

#[tokio::test]
async fn head_digest_skips_known_revision() {
    let body = serde_json::to_vec(&json!({"paths": {"/known": {}}})).unwrap();
    let d = digest(&body);
    let header_value = d.strip_prefix("sha256:").unwrap().to_string();
    let gets = Arc::new(AtomicUsize::new(0));

    let gets_in_handler = gets.clone();
    let body_for_get = body.clone();
    let router = Router::new()
        .route("/openapi", get(|| async { Json(json!(["2021-09-16"])) }))
        .route(
            "/openapi/:version",
            on(MethodFilter::HEAD, move || {
                let header_value = header_value.clone();
                async move {
                    (
                        StatusCode::OK,
                        [
                            (HeaderName::from_static("digest"), format!("sha-256={header_value}")),
                            (HeaderName::from_static("content-type"), "application/json".to_string()),
                        ],
                    )
                }
            })
            .on(MethodFilter::GET, move || {
                let gets = gets_in_handler.clone();
                let body = body_for_get.clone();
                async move {
                    gets.fetch_add(1, Ordering::SeqCst);
                    (
                        [(HeaderName::from_static("content-type"), "application/json".to_string())],
                        body,
                    )
                }
            }),
        );
    let url = serve(router).await;

    let storage: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    storage
        .notify_version(
            &url,
            &Version::parse("2021-09-16").unwrap(),
            &body,
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap();

    let scraper = scraper_for(
        vec![Service { name: "svc".into(), url: url.clone() }],
        storage.clone(),
    );
    scraper.run().await.unwrap();
    assert_eq!(gets.load(Ordering::SeqCst), 0, "GET should have been skipped");

    // An unknown digest still triggers the GET.
    let storage2: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    let scraper2 = scraper_for(
        vec![Service { name: "svc".into(), url: url.clone() }],
        storage2.clone(),
    );
    scraper2.run().await.unwrap();
    assert_eq!(gets.load(Ordering::SeqCst), 1);
    assert!(storage2
        .has_version(&url, &Version::parse("2021-09-16").unwrap(), &d)
        .await
        .unwrap());
}

#[tokio::test]
async fn malformed_version_in_list_fails_the_service() {
    let url = serve(Router::new().route("/openapi", get(|| async { Json(json!(["latest"])) }))).await;
    let storage: Arc<dyn Storage> = Arc::new(Store::memory(Collator::default()));
    let scraper = scraper_for(vec![Service { name: "svc".into(), url }], storage);
    let err = scraper.run().await.unwrap_err();
    assert_eq!(err.failures.len(), 1);
}
