//! Integration test: prediction form and JSON API

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use diamond_price::data::generate_diamonds;
use diamond_price::inference::ServeConfig;
use diamond_price::server::{create_router, AppState, ServerConfig};
use diamond_price::training::{train, TrainingConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt;

fn trained_model(dir: &Path) -> PathBuf {
    let model_path = dir.join("models").join("diamond_price_model.bin");
    let config = TrainingConfig::new()
        .with_max_depth(Some(4))
        .with_test_size(0.2)
        .with_random_state(42)
        .with_tracking_uri(format!("file:{}", dir.join("mlruns").display()))
        .with_experiment("server_tests")
        .with_model_path(&model_path)
        .with_register_model(None);
    train(config, &generate_diamonds(300, 21).unwrap()).unwrap();
    model_path
}

fn test_app(model_path: PathBuf) -> axum::Router {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        serve: ServeConfig::local(model_path),
    };
    create_router(Arc::new(AppState::new(config)))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 64).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const FORM: &str = "carat=0.7&cut=Premium&color=G&clarity=VS2&depth=61.5&table=57&x=5.5&y=5.5&z=3.4";

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().join("none.bin"));
    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_index_renders_form_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(trained_model(dir.path()));
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_string(response).await;
    for name in ["carat", "cut", "color", "clarity", "depth", "table", "x", "y", "z"] {
        assert!(html.contains(&format!("name=\"{}\"", name)), "missing input {}", name);
    }
    assert!(html.contains("value=\"61.5\""));
    assert!(html.contains("<option value=\"VS2\" selected>"));
    assert!(html.contains("local file"));
}

#[tokio::test]
async fn test_form_post_shows_price() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(trained_model(dir.path()));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(FORM))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Predicted price: <strong>$"));
}

#[tokio::test]
async fn test_form_post_out_of_range_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(trained_model(dir.path()));
    let form = FORM.replace("depth=61.5", "depth=99");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/predict")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("class=\"error\""));
    assert!(html.contains("depth"));

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_predict() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(trained_model(dir.path()));
    let row = serde_json::json!({
        "carat": 0.7, "cut": "Premium", "color": "G", "clarity": "VS2",
        "depth": 61.5, "table": 57.0, "x": 5.5, "y": 5.5, "z": 3.4
    });
    let response = app
        .oneshot(json_request("POST", "/api/predict", serde_json::json!({ "rows": [row.clone(), row] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["source"]["kind"], "local");
    let prices = json["predictions"].as_array().unwrap();
    assert_eq!(prices[0], prices[1]);
    assert!(prices[0].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_api_predict_invalid_row() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(trained_model(dir.path()));
    let row = serde_json::json!({ "carat": "heavy", "cut": "Premium" });
    let response = app
        .oneshot(json_request("POST", "/api/predict", serde_json::json!({ "rows": [row] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"], true);
}

#[tokio::test]
async fn test_api_predict_empty_rows() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(trained_model(dir.path()));
    let response = app
        .oneshot(json_request("POST", "/api/predict", serde_json::json!({ "rows": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_model_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().join("none.bin"));
    let response = app
        .oneshot(Request::builder().uri("/api/model").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_json(response).await["message"]
        .as_str()
        .unwrap()
        .contains("diamond-price train"));
}

#[tokio::test]
async fn test_model_info_and_cache_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(trained_model(dir.path()));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/api/model").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let info = body_json(response).await;
    assert_eq!(info["params"]["max_depth"], 4);
    assert!(info["tree_depth"].as_u64().unwrap() <= 4);
    assert_eq!(info["cache"]["entries"], 1);
    let cuts = info["categories"]["cut"].as_array().unwrap();
    assert!(!cuts.is_empty());
    assert!(cuts.windows(2).all(|w| w[0].as_str() < w[1].as_str()));

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/model/cache")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["evicted"], 1);
}

#[tokio::test]
async fn test_unknown_route() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path().join("none.bin"));
    let response = app
        .oneshot(Request::builder().uri("/api/nothing").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
