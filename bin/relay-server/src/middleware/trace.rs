//! Request tracing for webhook traffic.
//!
//! Every request runs inside an `http_request` span tagged with a trace id
//! and, for webhook deliveries, the originating platform.  Request bodies
//! carry customer messages and are never logged; only their declared size
//! is.  Error responses are small `{"error": ..}` documents and are logged
//! so a rejected delivery can be diagnosed from the logs alone.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Error bodies larger than this are summarised instead of logged.
const MAX_LOGGED_ERROR: usize = 512;

/// Platform name for a webhook path, `None` for every other route.
pub fn webhook_platform(path: &str) -> Option<&'static str> {
    match path {
        "/callback" => Some("line"),
        "/webhook" => Some("messenger"),
        _ => None,
    }
}

pub async fn trace_middleware(
    State(_state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    // The query string may hold the Messenger verify token.
    let path = req.uri().path().to_owned();
    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %path,
        platform = webhook_platform(&path).unwrap_or("-"),
    );

    async move {
        info!(
            body_bytes = content_length(req.headers()),
            signed = is_signed(req.headers()),
            "→ request started"
        );
        if let Some(value) = trace_header.clone() {
            req.headers_mut().insert(X_TRACE_ID, value);
        }

        let mut response = next.run(req).await;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            response = log_error_body(response).await;
        }
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = status.as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Whether the delivery carries a platform signature header.  The value
/// itself is never logged.
fn is_signed(headers: &HeaderMap) -> bool {
    headers.contains_key("x-line-signature") || headers.contains_key("x-hub-signature-256")
}

async fn log_error_body(response: Response) -> Response {
    let (parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read error response body");
            return Response::from_parts(parts, Body::empty());
        }
    };
    match std::str::from_utf8(&bytes) {
        Ok(text) if bytes.len() <= MAX_LOGGED_ERROR => {
            warn!(status = parts.status.as_u16(), body = %text, "request rejected")
        }
        _ => warn!(status = parts.status.as_u16(), size = bytes.len(), "request rejected"),
    }
    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn webhook_paths_name_their_platform() {
        assert_eq!(webhook_platform("/callback"), Some("line"));
        assert_eq!(webhook_platform("/webhook"), Some("messenger"));
        assert_eq!(webhook_platform("/health"), None);
        assert_eq!(webhook_platform("/admin/history/1"), None);
    }

    #[test]
    fn declared_length_and_signature_presence() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);
        assert!(!is_signed(&headers));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));
        headers.insert("x-line-signature", HeaderValue::from_static("abc"));
        assert_eq!(content_length(&headers), 42);
        assert!(is_signed(&headers));
    }
}
