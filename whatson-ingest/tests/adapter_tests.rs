//! HTTP adapter tests against a local stand-in server

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use whatson_common::config::ServiceConfig;
use whatson_common::{content_address, ItemType, Platform, Status};
use whatson_ingest::adapters::{PopularityFileAdapter, TmdbAdapter};
use whatson_ingest::preflight::check_services;
use whatson_ingest::{AdapterError, AdapterResult, BatchError, SourceAdapter, TitleReference};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn tmdb_tv(Path(id): Path<i64>, Query(params): Query<HashMap<String, String>>) -> Result<Json<Value>, StatusCode> {
    if params.get("api_key").map(String::as_str) != Some("secret") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    match id {
        1396 => Ok(Json(json!({
            "id": 1396,
            "name": "Breaking Bad",
            "poster_path": "/bb.jpg",
            "vote_average": 8.9,
            "vote_count": 14000,
            "status": "Ended",
            "number_of_seasons": 5,
            "videos": {"results": [{"key": "HhesaQXLuRY", "site": "YouTube", "type": "Trailer"}]}
        }))),
        503 => Err(StatusCode::SERVICE_UNAVAILABLE),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

fn reference(tmdb_id: Option<i64>, relative_url: &str) -> TitleReference {
    let canonical_url = format!("https://www.allocine.fr{}", relative_url);
    TitleReference {
        item_type: ItemType::Tvshow,
        relative_url: relative_url.to_string(),
        content_address: content_address::resolve(&canonical_url),
        canonical_url,
        allocine_id: None,
        tmdb_id,
        imdb_id: None,
        betaseries_id: None,
        metacritic_id: None,
        is_active: true,
    }
}

#[tokio::test]
async fn test_tmdb_adapter_observes_tv_show() {
    let base = serve(Router::new().route("/tv/:id", get(tmdb_tv))).await;
    let adapter = TmdbAdapter::new(&base, "secret", 50).unwrap();

    let AdapterResult::Observed(obs) = adapter.fetch(&reference(Some(1396), "/series/x=7157.html")).await else {
        panic!("expected an observation");
    };
    assert_eq!(adapter.platform(), Platform::Tmdb);
    assert_eq!(obs.rating.users_rating, Some(8.9));

    let details = obs.details.unwrap();
    assert_eq!(details.title.as_deref(), Some("Breaking Bad"));
    assert_eq!(details.seasons_number, Some(5));
    assert_eq!(details.status, Some(Status::Ended));
    assert_eq!(details.trailer_url.as_deref(), Some("https://www.youtube.com/watch?v=HhesaQXLuRY"));
}

#[tokio::test]
async fn test_tmdb_adapter_outcomes() {
    let base = serve(Router::new().route("/tv/:id", get(tmdb_tv))).await;
    let adapter = TmdbAdapter::new(&base, "secret", 50).unwrap();

    assert_eq!(
        adapter.fetch(&reference(Some(42), "/series/x=1.html")).await,
        AdapterResult::NotApplicable
    );
    assert_eq!(
        adapter.fetch(&reference(None, "/series/x=1.html")).await,
        AdapterResult::NotApplicable
    );

    let AdapterResult::Failed(e) = adapter.fetch(&reference(Some(503), "/series/x=1.html")).await else {
        panic!("expected a failure");
    };
    assert_eq!(e, AdapterError::Status { status: 503 });
    assert!(e.is_transient());

    let wrong_key = TmdbAdapter::new(&base, "nope", 50).unwrap();
    let AdapterResult::Failed(e) = wrong_key.fetch(&reference(Some(1396), "/series/x=1.html")).await else {
        panic!("expected a failure");
    };
    assert!(!e.is_transient());
}

#[tokio::test]
async fn test_popularity_file_adapter_ranks_titles() {
    let listing = (1..=8)
        .map(|n| format!("{},https://www.allocine.fr/series/ficheserie_gen_cserie={}.html", n, n * 100))
        .collect::<Vec<_>>()
        .join("\n");
    let base = serve(Router::new().route("/series.txt", get(move || async move { listing }))).await;

    let adapter = PopularityFileAdapter::new(Platform::Allocine, &format!("{}/series.txt", base)).unwrap();

    let AdapterResult::Observed(obs) = adapter
        .fetch(&reference(None, "/series/ficheserie_gen_cserie=300.html"))
        .await
    else {
        panic!("expected an observation");
    };
    assert_eq!(obs.rating.popularity, Some(3.0));

    assert_eq!(
        adapter.fetch(&reference(None, "/series/ficheserie_gen_cserie=301.html")).await,
        AdapterResult::NotApplicable
    );
}

#[tokio::test]
async fn test_popularity_file_sanity_check_failure() {
    let base = serve(Router::new().route("/series.txt", get(|| async { "<html>maintenance</html>" }))).await;
    let adapter = PopularityFileAdapter::new(Platform::Allocine, &format!("{}/series.txt", base)).unwrap();

    let AdapterResult::Failed(e) = adapter.fetch(&reference(None, "/series/x=1.html")).await else {
        panic!("expected a failure");
    };
    assert!(matches!(e, AdapterError::Invalid(_)));
}

#[tokio::test]
async fn test_preflight_checks_every_service() {
    let base = serve(
        Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE })),
    )
    .await;
    let client = reqwest::Client::new();

    let healthy = vec![ServiceConfig {
        name: "tmdb".into(),
        url: format!("{}/ok", base),
    }];
    check_services(&client, &healthy, 1, Duration::ZERO).await.unwrap();

    let mut services = healthy.clone();
    services.push(ServiceConfig {
        name: "imdb".into(),
        url: format!("{}/down", base),
    });
    let err = check_services(&client, &services, 1, Duration::ZERO).await.unwrap_err();
    match err {
        BatchError::Preflight(message) => assert!(message.contains("imdb")),
        other => panic!("unexpected error: {other}"),
    }
}
