//! Fetcher and ingestion pipeline tests against local mock servers.

use std::net::SocketAddr;
use std::time::Duration;

use rust_web_cloner::error::AppError;
use rust_web_cloner::fetcher::Fetcher;
use rust_web_cloner::guard::UrlGuard;
use rust_web_cloner::ingest::{ingest_website, ingest_with_deadline};
use rust_web_cloner::models::{ParseOptions, Source};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use wiremock::matchers::{any, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MB: u64 = 1024 * 1024;

// Helpers

/// Fetcher that may talk to the loopback mock server.
fn local_fetcher(timeout: Duration, max_bytes: u64) -> Fetcher {
    Fetcher::new(UrlGuard::new(true), timeout, max_bytes).unwrap()
}

fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
}

async fn serve(server: &MockServer, p: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// One-shot HTTP/1.1 server streaming `total` bytes with chunked encoding and no Content-Length.
async fn serve_chunked(total: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;

        let head = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
        if socket.write_all(head).await.is_err() {
            return;
        }
        let mut sent = 0;
        while sent < total {
            let size = (total - sent).min(1024);
            let chunk = format!("{:x}\r\n{}\r\n", size, "x".repeat(size));
            // The client hangs up once it has seen enough.
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
            sent += size;
        }
        let _ = socket.write_all(b"0\r\n\r\n").await;
    });
    addr
}

const PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>Mock Site</title>
  <link rel="stylesheet" href="/a.css">
  <link rel="stylesheet" href="/missing.css">
  <link rel="stylesheet" href="/c.css" media="print">
  <style>h1 { color: blue }</style>
  <script src="/app.js"></script>
  <script src="/broken.js"></script>
</head>
<body>
  <h1>Hello</h1>
  <img src="/logo.png">
  <script>window.ready = true;</script>
</body>
</html>"#;

// Fetcher

#[tokio::test]
async fn fetch_sends_browser_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header_regex("user-agent", r"Chrome/120\.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = local_fetcher(Duration::from_secs(5), MB)
        .fetch(&url(&server, "/"))
        .await
        .unwrap();
    assert_eq!(fetched.status, 200);
    assert_eq!(fetched.body, "<p>ok</p>");
}

#[tokio::test]
async fn non_success_status_is_typed() {
    let server = MockServer::start().await;
    serve(&server, "/gone", 404, "nope").await;

    let err = local_fetcher(Duration::from_secs(5), MB)
        .fetch(&url(&server, "/gone"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::HttpStatus(404)));
}

#[tokio::test]
async fn declared_length_over_limit_is_too_large() {
    let server = MockServer::start().await;
    serve(&server, "/big", 200, &"x".repeat(4096)).await;

    let err = local_fetcher(Duration::from_secs(5), 1024)
        .fetch(&url(&server, "/big"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TooLarge));
}

#[tokio::test]
async fn ten_megabytes_fit_under_fifty_but_sixty_do_not() {
    let server = MockServer::start().await;
    serve(&server, "/ten", 200, &"a".repeat((10 * MB) as usize)).await;
    serve(&server, "/sixty", 200, &"b".repeat((60 * MB) as usize)).await;

    let fetcher = local_fetcher(Duration::from_secs(30), 50 * MB);

    let fetched = fetcher.fetch(&url(&server, "/ten")).await.unwrap();
    assert_eq!(fetched.body.len() as u64, 10 * MB);

    let err = fetcher.fetch(&url(&server, "/sixty")).await.unwrap_err();
    assert!(matches!(err, AppError::TooLarge));
}

#[tokio::test]
async fn streamed_body_over_limit_is_too_large() {
    let addr = serve_chunked(16 * 1024).await;
    let url = Url::parse(&format!("http://{}/", addr)).unwrap();

    let err = local_fetcher(Duration::from_secs(5), 4096).fetch(&url).await.unwrap_err();
    assert!(matches!(err, AppError::TooLarge));
}

#[tokio::test]
async fn streamed_body_under_limit_is_read_whole() {
    let addr = serve_chunked(3000).await;
    let url = Url::parse(&format!("http://{}/", addr)).unwrap();

    let fetched = local_fetcher(Duration::from_secs(5), 4096).fetch(&url).await.unwrap();
    assert_eq!(fetched.body.len(), 3000);
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let err = local_fetcher(Duration::from_millis(100), MB)
        .fetch(&url(&server, "/slow"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout));
}

#[tokio::test]
async fn strict_guard_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(UrlGuard::default(), Duration::from_secs(5), MB).unwrap();
    let err = fetcher.fetch(&url(&server, "/")).await.unwrap_err();
    assert!(matches!(err, AppError::ForbiddenHost));
}

// Ingestion

#[tokio::test]
async fn failed_external_resources_are_left_out() {
    let server = MockServer::start().await;
    serve(&server, "/page", 200, PAGE).await;
    serve(&server, "/a.css", 200, "/* a */ body { margin: 0 }").await;
    serve(&server, "/missing.css", 404, "").await;
    serve(&server, "/c.css", 200, "p{}").await;
    serve(&server, "/app.js", 200, "  start();  ").await;
    serve(&server, "/broken.js", 500, "").await;

    let fetcher = local_fetcher(Duration::from_secs(5), MB);
    let content = ingest_website(&fetcher, &url(&server, "/page"), &ParseOptions::default())
        .await
        .unwrap();

    assert_eq!(content.title, "Mock Site");

    // One inline plus three external stylesheets, one of which failed.
    let css: Vec<_> = content.css.iter().map(|c| (c.id.as_str(), c.name.as_str(), c.source)).collect();
    assert_eq!(
        css,
        vec![
            ("inline-style-1", "inline-style-1.css", Source::Inline),
            ("external-css-2", "a.css", Source::External),
            ("external-css-3", "c.css", Source::External),
        ]
    );
    assert_eq!(content.css[1].content, "body { margin: 0 }");
    assert_eq!(content.css[2].media.as_deref(), Some("print"));

    let js: Vec<_> = content.js.iter().map(|j| (j.id.as_str(), j.content.as_str())).collect();
    assert_eq!(
        js,
        vec![("inline-script-1", "window.ready = true;"), ("external-js-2", "start();")]
    );

    assert_eq!(content.assets.len(), 1);
    assert_eq!(content.assets[0].original_url, format!("{}/logo.png", server.uri()));

    assert!(content.html.contains("<h1>Hello</h1>"));
    assert!(!content.html.contains("<link"));
    assert!(!content.html.contains("<script"));
    assert!(!content.html.contains("<style"));
}

#[tokio::test]
async fn excluding_assets_skips_external_fetches() {
    let server = MockServer::start().await;
    serve(&server, "/page", 200, PAGE).await;
    Mock::given(method("GET"))
        .and(path("/a.css"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let options = ParseOptions {
        include_external_assets: false,
        ..ParseOptions::default()
    };
    let fetcher = local_fetcher(Duration::from_secs(5), MB);
    let content = ingest_website(&fetcher, &url(&server, "/page"), &options).await.unwrap();

    assert_eq!(content.css.len(), 1);
    assert_eq!(content.js.len(), 1);
    assert!(content.assets.is_empty());
}

#[tokio::test]
async fn main_document_failure_fails_ingestion() {
    let server = MockServer::start().await;
    serve(&server, "/page", 503, "").await;

    let fetcher = local_fetcher(Duration::from_secs(5), MB);
    let err = ingest_website(&fetcher, &url(&server, "/page"), &ParseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::HttpStatus(503)));
}

#[tokio::test]
async fn optional_deadline_bounds_slow_sub_resources() {
    let server = MockServer::start().await;
    serve(&server, "/page", 200, r#"<html><head><link rel="stylesheet" href="/slow.css"></head></html>"#).await;
    Mock::given(method("GET"))
        .and(path("/slow.css"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let fetcher = local_fetcher(Duration::from_secs(5), MB);
    let page = url(&server, "/page");
    let options = ParseOptions::default();

    let err = ingest_with_deadline(&fetcher, &page, &options, Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout));

    let content = ingest_with_deadline(&fetcher, &page, &options, None).await.unwrap();
    assert_eq!(content.css.len(), 1);
}

#[tokio::test]
#[ignore = "requires network access"]
async fn example_dot_com_end_to_end() {
    let guard = UrlGuard::default();
    let url = guard.validate("example.com").unwrap();
    assert_eq!(url.as_str(), "https://example.com/");

    let fetcher = Fetcher::new(guard, Duration::from_secs(30), 50 * MB).unwrap();
    let content = ingest_website(&fetcher, &url, &ParseOptions::default()).await.unwrap();
    assert_eq!(content.title, "Example Domain");
    assert!(content.css.iter().all(|c| c.source == Source::Inline));
    assert!(content.js.iter().all(|j| j.source == Source::Inline));
}
