use std::{collections::HashSet, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, debug, info, info_span};
use url::Url;
use uuid::Uuid;

use crate::{
    config::{RelayConfig, ResponseMode, non_empty},
    error::{ApiError, INVALID_URL_MESSAGE, MISSING_URL_MESSAGE},
    normalize::{NormalizedVideoUrl, VideoUrlNormalizer},
    relay::{Conversion, ConversionRelay},
};

pub const STATUS_BANNER: &str = "✅ YouTube MP3 API running. Use /download?url=VIDEO_URL";
const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";
const DOWNLOAD_FILENAME_HEADER: &str = "x-download-filename";

#[derive(Clone)]
pub struct AppState {
    relay: Arc<ConversionRelay>,
    normalizer: VideoUrlNormalizer,
    response_mode: ResponseMode,
}

impl AppState {
    pub fn new(config: &RelayConfig) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.upstream.request_timeout)
            .build()
            .map_err(|error| ApiError::internal(format!("Could not build HTTP client: {error}")))?;

        Ok(Self {
            relay: Arc::new(ConversionRelay::new(
                http_client,
                config.upstream.clone(),
                config.queue_retry,
                config.deadline,
            )),
            normalizer: VideoUrlNormalizer {
                accept_shorts: config.accept_shorts,
            },
            response_mode: config.response_mode,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct Base64Payload {
    filename: String,
    base64: String,
}

pub fn build_router(config: &RelayConfig, state: AppState) -> Result<Router, ApiError> {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/download", get(download));
    if config.status_route {
        router = router.route("/", get(status_banner));
    }

    let cors = build_cors_layer(&config.allowed_origins)?;

    Ok(router
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn status_banner() -> &'static str {
    STATUS_BANNER
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let raw_url = query
        .url
        .as_deref()
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request(MISSING_URL_MESSAGE))?;

    let video_url = state
        .normalizer
        .normalize(raw_url)
        .ok_or_else(|| ApiError::bad_request(INVALID_URL_MESSAGE))?;

    let span = info_span!(
        "download",
        request_id = %Uuid::new_v4(),
        video_id = video_url.video_id()
    );
    debug!(parent: &span, "Normalized {raw_url:?} to {video_url}");
    relay_download(&state, &video_url).instrument(span).await
}

async fn relay_download(
    state: &AppState,
    video_url: &NormalizedVideoUrl,
) -> Result<Response, ApiError> {
    let conversion = state.relay.convert(video_url).await?;
    info!("Relaying {} as {}", conversion.filename, state.response_mode);
    match state.response_mode {
        ResponseMode::Json => Ok(json_response(conversion)),
        ResponseMode::Download => download_response(conversion),
    }
}

fn json_response(conversion: Conversion) -> Response {
    Json(Base64Payload {
        base64: BASE64.encode(&conversion.audio),
        filename: conversion.filename,
    })
    .into_response()
}

fn download_response(conversion: Conversion) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(AUDIO_CONTENT_TYPE));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(conversion.audio.len()));

    let content_disposition = build_content_disposition(&conversion.filename);
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&content_disposition)
            .map_err(|_| ApiError::internal("Could not build the download header."))?,
    );
    headers.insert(
        HeaderName::from_static(DOWNLOAD_FILENAME_HEADER),
        HeaderValue::from_str(&sanitize_ascii_filename(&conversion.filename))
            .map_err(|_| ApiError::internal("Could not build the file name header."))?,
    );

    Ok((headers, Body::from(conversion.audio)).into_response())
}

fn build_cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ApiError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers([
            CONTENT_DISPOSITION,
            HeaderName::from_static(DOWNLOAD_FILENAME_HEADER),
        ]);

    if allowed_origins.is_empty() {
        info!("ALLOWED_ORIGINS not set; accepting requests from any origin");
        return Ok(layer.allow_origin(Any));
    }

    let normalized_origins = allowed_origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        normalized_origins.len(),
        normalized_origins
    );

    let allowed = Arc::new(normalized_origins);
    Ok(
        layer.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let is_allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed.contains(value));
            debug!("CORS origin check raw={origin:?} allowed={is_allowed}");
            is_allowed
        })),
    )
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}

fn build_content_disposition(filename: &str) -> String {
    let safe_ascii = sanitize_ascii_filename(filename);
    format!(
        "attachment; filename=\"{safe_ascii}\"; filename*=UTF-8''{}",
        urlencoding::encode(filename)
    )
}

fn sanitize_ascii_filename(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric()
                || matches!(character, '.' | '-' | '_' | ' ' | '(' | ')')
            {
                character
            } else {
                '_'
            }
        })
        .collect();

    let compact = sanitized.trim();
    if compact.is_empty() {
        crate::relay::DEFAULT_FILENAME.to_string()
    } else {
        compact.to_string()
    }
}
