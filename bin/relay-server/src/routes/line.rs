//! LINE webhook.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use tracing::warn;
use utoipa::OpenApi;

use crate::channels::line::{decode_events, SIGNATURE_HEADER};
use crate::channels::ChannelAdapter;
use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(line_callback))]
pub struct LineApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/callback", post(line_callback))
}

/// LINE Messaging API webhook.
///
/// Verifies `X-Line-Signature`, acknowledges immediately and relays text
/// messages in the background.
#[utoipa::path(
    post,
    path = "/callback",
    tag = "webhooks",
    request_body(content = String, description = "LINE webhook body", content_type = "application/json"),
    responses(
        (status = 200, description = "Accepted", body = String),
        (status = 400, description = "Missing or invalid signature, or malformed body"),
        (status = 404, description = "LINE is not configured"),
    )
)]
pub async fn line_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ServerError> {
    let line = state
        .line
        .clone()
        .ok_or_else(|| ServerError::NotFound("LINE channel is not configured".into()))?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !line.verify_signature(signature, &body) {
        warn!(has_signature = signature.is_some(), "rejecting LINE webhook with bad signature");
        return Err(ServerError::BadRequest("invalid signature".into()));
    }

    let events = decode_events(&body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let channel: Arc<dyn ChannelAdapter> = line;
    state.relay.spawn_batch(channel, events);
    Ok("OK")
}

#[cfg(test)]
mod test {
    use crate::entities::{ChatStore, UserStore};
    use crate::routes::build;
    use crate::testing::{mock_line_api, relay_test_state, test_state, LINE_SECRET};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use hmac::{Hmac, Mac};
    use relay_agent::Completion;
    use sha2::Sha256;
    use std::time::Duration;
    use tower::ServiceExt;

    fn signed(body: &'static str, signature: Option<String>) -> Request<Body> {
        let mut req = Request::post("/callback").header("content-type", "application/json");
        if let Some(sig) = signature {
            req = req.header("x-line-signature", sig);
        }
        req.body(Body::from(body)).unwrap()
    }

    fn sign(body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(LINE_SECRET.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn valid_signature_is_acknowledged() {
        let body = r#"{"destination":"U0","events":[]}"#;
        let resp = build(test_state().await)
            .oneshot(signed(body, Some(sign(body))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let resp = build(test_state().await)
            .oneshot(signed(r#"{"events":[]}"#, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected() {
        let body = r#"{"events":[]}"#;
        let resp = build(test_state().await)
            .oneshot(signed(body, Some(sign("something else"))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn text_event_is_relayed_and_stored() {
        let line_api = mock_line_api("Ann").await;
        let state = relay_test_state(&line_api, vec![Completion::text("Hello Ann!")]).await;
        let body = r#"{"destination":"U0","events":[
            {"type":"message","replyToken":"r1","timestamp":1700000000000,
             "source":{"type":"user","userId":"U1"},
             "message":{"type":"text","id":"1","text":"Do you do whitening?"}}
        ]}"#;

        let resp = build(state.clone())
            .oneshot(signed(body, Some(sign(body))))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // The delivery is handled in the background after the acknowledgement.
        let mut turns = Vec::new();
        for _ in 0..100 {
            turns = state.store.read_turns("U1").await.unwrap();
            if turns.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(turns.len(), 2);
        assert_eq!((turns[0].role.as_str(), turns[0].content.as_str()), ("user", "Do you do whitening?"));
        assert_eq!((turns[1].role.as_str(), turns[1].content.as_str()), ("assistant", "Hello Ann!"));
        assert_eq!(turns[0].channel_timestamp.as_deref(), Some("1700000000000"));

        let user = state.store.get_user("U1").await.unwrap().unwrap();
        assert_eq!(user.user_name, "Ann");
    }
}
