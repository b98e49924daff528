use std::time::Duration;

use axum::Router;
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use server::entity::image::UploaderKind;

use crate::common::{API_KEY, TestApp, png, routes, spawn_origin};

/// Origin serving a PNG, an HTML page, a slow image, a 404 and an
/// image that only loads with a same-origin `Referer`.
async fn origin() -> String {
    let image = png(9, 4);
    let guarded = image.clone();
    let app = Router::new()
        .route(
            "/pics/cat.png",
            get(move || {
                let image = image.clone();
                async move { ([(header::CONTENT_TYPE, "image/png")], image) }
            }),
        )
        .route(
            "/page",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html></html>") }),
        )
        .route(
            "/slow.png",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                ([(header::CONTENT_TYPE, "image/png")], "late")
            }),
        )
        .route("/gone.png", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/hotlink/raw",
            get(move |headers: HeaderMap| {
                let guarded = guarded.clone();
                async move {
                    let referer = headers
                        .get(header::REFERER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let host = headers
                        .get(header::HOST)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if referer != format!("http://{host}/") {
                        return Err(StatusCode::FORBIDDEN);
                    }
                    Ok(([(header::CONTENT_TYPE, "image/png")], guarded))
                }
            }),
        );
    spawn_origin(app).await
}

#[tokio::test]
async fn fetches_and_stores_remote_image() {
    let app = TestApp::spawn().await;
    let base = origin().await;
    let url = format!("{base}/pics/cat.png");

    let res = app
        .post_with_key(routes::UPLOAD_URL, &json!({ "url": url }), API_KEY)
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    let data = &res.body["data"];
    assert_eq!(data["format"], "png");
    assert_eq!(data["width"], 9);
    assert_eq!(data["height"], 4);
    assert!(data.get("base64").is_none());

    let record = app.find_image(data["uuid"].as_str().unwrap()).await;
    assert_eq!(record.source_url.as_deref(), Some(url.as_str()));
    assert_eq!(record.original_name, "cat.png");
    assert_eq!(record.uploaded_by_type, UploaderKind::UrlFetchApiKey);
    assert!(record.api_key_id.is_some());
    assert_eq!(app.stored_files().len(), 1);
}

#[tokio::test]
async fn referer_satisfies_hotlink_protection() {
    let app = TestApp::spawn().await;
    let base = origin().await;

    let res = app
        .post_with_key(
            routes::UPLOAD_URL,
            &json!({ "url": format!("{base}/hotlink/raw") }),
            API_KEY,
        )
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["data"]["format"], "png");
    let record = app.find_image(res.body["data"]["uuid"].as_str().unwrap()).await;
    assert_eq!(record.original_name, "raw.png");
}

#[tokio::test]
async fn returns_base64_when_requested() {
    let app = TestApp::spawn().await;
    let base = origin().await;
    let url = format!("{base}/pics/cat.png");

    let bare = app
        .post_with_key(
            routes::UPLOAD_URL,
            &json!({ "url": url, "returnBase64": true }),
            API_KEY,
        )
        .await;
    assert_eq!(bare.status, 200, "{}", bare.text);
    assert_eq!(bare.body["data"]["base64"], STANDARD.encode(png(9, 4)));

    let uri = app
        .post_with_key(
            routes::UPLOAD_URL,
            &json!({ "url": url, "returnBase64": true, "base64DataUri": true }),
            API_KEY,
        )
        .await;
    assert_eq!(uri.status, 200, "{}", uri.text);
    assert!(
        uri.body["data"]["base64"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,")
    );
}

#[tokio::test]
async fn non_image_content_type_leaves_no_trace() {
    let app = TestApp::spawn().await;
    let base = origin().await;

    let res = app
        .post_with_key(
            routes::UPLOAD_URL,
            &json!({ "url": format!("{base}/page") }),
            API_KEY,
        )
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "INVALID_INPUT");
    assert!(app.stored_files().is_empty());
    assert_eq!(app.image_count().await, 0);
}

#[tokio::test]
async fn slow_origin_times_out() {
    let app = TestApp::spawn_with(|upload| upload.fetch_timeout_secs = 1).await;
    let base = origin().await;

    let res = app
        .post_with_key(
            routes::UPLOAD_URL,
            &json!({ "url": format!("{base}/slow.png") }),
            API_KEY,
        )
        .await;

    assert_eq!(res.status, 408);
    assert_eq!(res.code(), "TIMEOUT");
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn origin_error_status_is_reported() {
    let app = TestApp::spawn().await;
    let base = origin().await;

    let res = app
        .post_with_key(
            routes::UPLOAD_URL,
            &json!({ "url": format!("{base}/gone.png") }),
            API_KEY,
        )
        .await;

    assert_eq!(res.status, 400);
    assert!(res.body["message"].as_str().unwrap().contains("404"), "{}", res.text);
}

#[tokio::test]
async fn oversized_remote_image_is_too_large() {
    let app = TestApp::spawn_with(|upload| upload.max_file_size = 32).await;
    let base = origin().await;

    let res = app
        .post_with_key(
            routes::UPLOAD_URL,
            &json!({ "url": format!("{base}/pics/cat.png") }),
            API_KEY,
        )
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "TOO_LARGE");
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn invalid_urls_are_rejected() {
    let app = TestApp::spawn().await;

    for url in ["not a url", "ftp://example.com/a.png", "file:///etc/hosts"] {
        let res = app
            .post_with_key(routes::UPLOAD_URL, &json!({ "url": url }), API_KEY)
            .await;
        assert_eq!(res.status, 400, "{url}");
        assert_eq!(res.code(), "INVALID_INPUT");
    }
}

#[tokio::test]
async fn session_caller_is_recorded_as_url_fetch() {
    let app = TestApp::spawn().await;
    let base = origin().await;

    let res = app
        .post_with_token(
            routes::UPLOAD_URL,
            &json!({ "url": format!("{base}/pics/cat.png") }),
            &app.session,
        )
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    let record = app.find_image(res.body["data"]["uuid"].as_str().unwrap()).await;
    assert_eq!(record.uploaded_by_type, UploaderKind::UrlFetch);
    assert_eq!(record.uploaded_by, "admin");
    assert!(record.api_key_id.is_none());
}

#[tokio::test]
async fn anonymous_caller_is_unauthorized() {
    let app = TestApp::spawn().await;

    let res = app
        .post_without_auth(
            routes::UPLOAD_URL,
            &json!({ "url": "http://127.0.0.1:9/a.png" }),
        )
        .await;

    assert_eq!(res.status, 401);
}
