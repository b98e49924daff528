use reqwest::header;

use crate::common::{TestApp, routes};

fn header_str<'a>(res: &'a reqwest::Response, name: header::HeaderName) -> &'a str {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn serves_bytes_with_cache_headers() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;
    let file = data["filename"].as_str().unwrap();
    let stored = std::fs::read(app.storage_root.join(file)).unwrap();

    let res = app.get(&routes::image(file), None).await;

    assert_eq!(res.status(), 200);
    assert_eq!(header_str(&res, header::CONTENT_TYPE), "image/png");
    assert_eq!(header_str(&res, header::CONTENT_LENGTH), stored.len().to_string());
    assert_eq!(
        header_str(&res, header::CACHE_CONTROL),
        "public, max-age=31536000, immutable"
    );
    assert_eq!(header_str(&res, header::X_CONTENT_TYPE_OPTIONS), "nosniff");
    assert!(header_str(&res, header::EXPIRES).ends_with(" GMT"));
    assert!(header_str(&res, header::LAST_MODIFIED).ends_with(" GMT"));
    assert!(header_str(&res, header::ETAG).starts_with('"'));

    let body = res.bytes().await.unwrap();
    assert_eq!(body.as_ref(), stored.as_slice());
}

#[tokio::test]
async fn etag_is_stable_and_conditional_get_is_not_modified() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;
    let path = routes::image(data["filename"].as_str().unwrap());

    let first = app.get(&path, None).await;
    let etag = header_str(&first, header::ETAG).to_string();
    let second = app.get(&path, None).await;
    assert_eq!(header_str(&second, header::ETAG), etag);

    let cached = app.get(&path, Some(&etag)).await;
    assert_eq!(cached.status(), 304);
    assert!(cached.headers().get(header::CONTENT_TYPE).is_none());
    assert!(cached.bytes().await.unwrap().is_empty());

    let stale = app.get(&path, Some("\"something-else\"")).await;
    assert_eq!(stale.status(), 200);
}

#[tokio::test]
async fn etag_changes_when_record_is_modified() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;
    let uuid = data["uuid"].as_str().unwrap();
    let path = routes::image(data["filename"].as_str().unwrap());

    let before = header_str(&app.get(&path, None).await, header::ETAG).to_string();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    app.moderate(uuid, false, false).await;
    let after = app.get(&path, Some(&before)).await;

    assert_eq!(after.status(), 200);
    assert_ne!(header_str(&after, header::ETAG), before);
}

#[tokio::test]
async fn deleted_image_is_indistinguishable_from_missing() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;
    let uuid = data["uuid"].as_str().unwrap();
    let file = data["filename"].as_str().unwrap();

    app.moderate(uuid, true, false).await;
    // The file stays on disk; only the flag hides it.
    assert!(app.storage_root.join(file).exists());

    let deleted = app.get(&routes::image(file), None).await;
    let deleted_status = deleted.status();
    let deleted_body = deleted.text().await.unwrap();

    let missing = app
        .get(&routes::image("00000000-0000-4000-8000-000000000000.png"), None)
        .await;
    let missing_status = missing.status();
    let missing_body = missing.text().await.unwrap();

    assert_eq!(deleted_status, 404);
    assert_eq!(missing_status, 404);
    assert_eq!(deleted_body, missing_body);
}

#[tokio::test]
async fn nsfw_image_is_forbidden() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;

    app.moderate(data["uuid"].as_str().unwrap(), false, true).await;

    let res = app.get(&routes::image(data["filename"].as_str().unwrap()), None).await;
    assert_eq!(res.status(), 403);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn malformed_paths_are_not_found() {
    let app = TestApp::spawn().await;

    for file in ["nope", "zzzz.png", "1234.png", "..%2Fetc.png", "abc.p-g"] {
        let res = app.get(&routes::image(file), None).await;
        assert_eq!(res.status(), 404, "{file}");
    }
}

#[tokio::test]
async fn non_ascii_extension_is_not_found() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;
    let uuid = data["uuid"].as_str().unwrap();

    let res = app.get(&routes::image(&format!("{uuid}.pñg")), None).await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn record_without_file_is_not_found() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;
    let file = data["filename"].as_str().unwrap();

    std::fs::remove_file(app.storage_root.join(file)).unwrap();

    let res = app.get(&routes::image(file), None).await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn requested_extension_does_not_select_the_file() {
    let app = TestApp::spawn().await;
    let data = app.upload_png().await;
    let uuid = data["uuid"].as_str().unwrap();

    let res = app.get(&routes::image(&format!("{uuid}.jpg")), None).await;
    assert_eq!(res.status(), 200);
    assert_eq!(header_str(&res, header::CONTENT_TYPE), "image/png");
}
