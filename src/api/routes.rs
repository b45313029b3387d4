use axum::{
    routing::{get, post},
    Router,
    extract::{Json, State, rejection::JsonRejection},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use url::Url;

use crate::error::{AppError, Result};
use crate::api::models::{
    DebugPayload, ExportRequest, FetchWebsitePayload, FetchWebsiteRequest, PreviewPayload,
    PreviewRequest, MessagePayload,
};
use crate::api::response;
use crate::export::{archive_filename, build_archive};
use crate::ingest::ingest_with_deadline;
use crate::models::ParseOptions;
use crate::preview::render_preview_url;
use crate::serializer;
use crate::AppState;

const DEBUG_FETCH_URL: &str = "https://example.com";

pub fn create_router(app_state: AppState) -> Router {
    let api = Router::new()
        .route("/fetch-website", post(fetch_website_handler))
        .route("/preview", post(preview_handler))
        .route("/export", post(export_handler))
        .route("/test", get(test_get_handler).post(test_post_handler))
        .route("/debug", get(debug_handler));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .with_state(app_state)
}

/// Unwraps a JSON body, answering malformed input in the API's own error shape.
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> std::result::Result<T, Response> {
    body.map(|Json(value)| value).map_err(|rejection| {
        warn!(error = %rejection, "rejected request body");
        response::error(StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
    })
}

async fn fetch_website_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<FetchWebsiteRequest>, JsonRejection>,
) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };

    let Some(raw_url) = req.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return response::error(StatusCode::BAD_REQUEST, "URL is required".to_string()).into_response();
    };

    let url = match state.fetcher.guard().validate(raw_url) {
        Ok(url) => url,
        Err(err) => {
            warn!(url = raw_url, error = %err, "rejected URL");
            return err.into_response();
        }
    };

    let options = ParseOptions {
        include_external_assets: req.include_assets != Some(false),
        ..ParseOptions::default()
    };

    info!(%url, "fetching website");
    let start = std::time::Instant::now();
    let result = ingest_with_deadline(&state.fetcher, &url, &options, state.config.ingest_deadline).await;
    info!(%url, elapsed = ?start.elapsed(), ok = result.is_ok(), "request processing finished");

    match result {
        Ok(content) => match serializer::serialize_content(&content) {
            Ok(data) => response::success(FetchWebsitePayload { data }).into_response(),
            Err(err) => {
                error!(%url, error = %err, "response failed JSON safety check");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(serializer::failure_payload())).into_response()
            }
        },
        Err(err) => {
            error!(%url, error = %err, "error fetching website");
            err.into_response()
        }
    }
}

async fn preview_handler(body: std::result::Result<Json<PreviewRequest>, JsonRejection>) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };

    let Some(html) = req.html.filter(|h| !h.is_empty()) else {
        return response::error(StatusCode::BAD_REQUEST, "HTML content is required".to_string()).into_response();
    };

    let preview_url = render_preview_url(&html, &req.css, &req.js);
    info!(bytes = preview_url.len(), css = req.css.len(), js = req.js.len(), "preview generated");
    response::success(PreviewPayload { preview_url }).into_response()
}

async fn export_handler(body: std::result::Result<Json<ExportRequest>, JsonRejection>) -> Response {
    let req = match json_body(body) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };

    let Some(content) = req.content else {
        return response::error(StatusCode::BAD_REQUEST, "Website content is required".to_string()).into_response();
    };

    match export_archive(content, req.include_assets).await {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "error exporting website");
            err.into_response()
        }
    }
}

async fn export_archive(content: crate::models::WebsiteContent, include_assets: bool) -> Result<Response> {
    let exported_at = Utc::now();
    let filename = archive_filename(&content, exported_at);

    let bytes = tokio::task::spawn_blocking(move || build_archive(&content, include_assets, exported_at))
        .await
        .map_err(|e| AppError::Export(e.to_string()))??;

    info!(%filename, bytes = bytes.len(), "website exported");
    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
    ];
    Ok((StatusCode::OK, headers, bytes).into_response())
}

async fn test_get_handler() -> Response {
    response::success_stamped(MessagePayload {
        message: "API is working correctly".to_string(),
    })
    .into_response()
}

async fn test_post_handler() -> Response {
    response::success_stamped(MessagePayload {
        message: "POST endpoint is working correctly".to_string(),
    })
    .into_response()
}

/// Fetches a known page and reports how JSON-hostile its raw body is.
async fn debug_handler(State(state): State<AppState>) -> Response {
    let result = match Url::parse(DEBUG_FETCH_URL) {
        Ok(url) => state.fetcher.fetch(&url).await,
        Err(_) => Err(AppError::InvalidUrl),
    };

    match result {
        Ok(page) => {
            let problematic = page
                .body
                .chars()
                .filter(|c| matches!(*c, '\u{0}'..='\u{1F}' | '\u{7F}'..='\u{9F}'))
                .count();
            info!(bytes = page.body.len(), problematic, "debug page fetched");
            response::success_stamped(DebugPayload {
                status: "debug".to_string(),
                html_length: page.body.len(),
                has_problematic_chars: problematic > 0,
                problematic_char_count: problematic,
                first_chars: page.body.chars().take(100).collect(),
            })
            .into_response()
        }
        Err(err) => {
            error!(error = %err, "debug fetch failed");
            err.into_response()
        }
    }
}
