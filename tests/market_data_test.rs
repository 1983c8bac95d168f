use axum::http::StatusCode;
use chrono::NaiveDate;
use formosa::analysis::IndicatorService;
use formosa::api;
use formosa::datasource::MockFeed;
use formosa::db::init_db;
use formosa::realtime::RealtimeService;
use formosa::sync::BulkSyncWorker;
use formosa::{Decimal, OhlcvBar, Repository};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    repo: Arc<Repository>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    let feed = Arc::new(MockFeed::new());
    let realtime = Arc::new(RealtimeService::new(feed.clone(), Duration::from_secs(5)));
    let bulk_sync = Arc::new(BulkSyncWorker::new(
        repo.clone(),
        feed,
        Duration::from_millis(10),
        2,
        5,
    ));
    let indicators = Arc::new(IndicatorService::new(repo.clone(), 86_400));

    let app = api::create_router(api::AppState {
        repo: repo.clone(),
        realtime,
        bulk_sync,
        indicators,
    });

    TestApp {
        app,
        repo,
        _temp: temp_dir,
    }
}

fn bar(symbol: &str, day: &str, close: &str, volume: i64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date: NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
        open: Decimal::from_str(close).unwrap(),
        high: Decimal::from_str(close).unwrap(),
        low: Decimal::from_str(close).unwrap(),
        close: Decimal::from_str(close).unwrap(),
        volume,
        turnover: Decimal::from_str("1000").unwrap(),
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_ohlcv_window_and_order() {
    let test_app = setup_test_app().await;
    test_app
        .repo
        .upsert_bars(&[
            bar("2330", "2024-01-02", "582", 100),
            bar("2330", "2024-01-03", "580", 110),
            bar("2330", "2024-01-04", "585", 120),
        ])
        .await
        .unwrap();

    let (status, body) = get(
        test_app.app.clone(),
        "/stocks/2330/ohlcv?from=2024-01-02&to=2024-01-03",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);

    // Newest first.
    let data = body["data"].as_array().unwrap();
    assert_eq!(data[0]["date"], "2024-01-03");
    assert_eq!(data[1]["date"], "2024-01-02");
}

#[tokio::test]
async fn test_ohlcv_timeframe_routing() {
    let test_app = setup_test_app().await;
    test_app
        .repo
        .upsert_bars(&[
            bar("2330", "2024-01-02", "582", 100),
            bar("2330", "2024-01-03", "580", 110),
            bar("2330", "2024-01-08", "585", 120),
        ])
        .await
        .unwrap();
    test_app.repo.refresh_aggregates().await.unwrap();

    let (status, body) = get(
        test_app.app.clone(),
        "/stocks/2330/ohlcv?timeframe=1w",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timeframe"], "1w");
    assert_eq!(body["count"], 2);

    let (status, body) = get(
        test_app.app.clone(),
        "/stocks/2330/ohlcv?timeframe=1m",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    let monthly = &body["data"][0];
    assert_eq!(monthly["date"], "2024-01-01");
    assert_eq!(monthly["volume"], 330);

    let (status, _) = get(
        test_app.app.clone(),
        "/stocks/2330/ohlcv?timeframe=1h",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ohlcv_bad_dates_rejected() {
    let test_app = setup_test_app().await;

    let (status, _) = get(
        test_app.app.clone(),
        "/stocks/2330/ohlcv?from=02-01-2024",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(
        test_app.app.clone(),
        "/stocks/2330/ohlcv?from=2024-01-05&to=2024-01-02",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_aggregates_endpoint() {
    let test_app = setup_test_app().await;
    test_app
        .repo
        .upsert_bars(&[bar("2330", "2024-01-02", "582", 100)])
        .await
        .unwrap();

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/market/refresh-aggregates")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = test_app.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (_, body) = get(
        test_app.app.clone(),
        "/stocks/2330/ohlcv?timeframe=1w",
    )
    .await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_symbol_suffix_accepted_on_input() {
    let test_app = setup_test_app().await;
    test_app
        .repo
        .upsert_bars(&[bar("2330", "2024-01-02", "582", 100)])
        .await
        .unwrap();

    let (status, body) = get(test_app.app.clone(), "/stocks/2330.TW/ohlcv").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "2330");
    assert_eq!(body["count"], 1);
}
