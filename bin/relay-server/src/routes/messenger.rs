//! Messenger webhook: subscription handshake and event delivery.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::channels::messenger::{decode_events, MessengerChannel, SIGNATURE_HEADER};
use crate::channels::ChannelAdapter;
use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(verify_webhook, receive_webhook))]
pub struct MessengerApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", get(verify_webhook).post(receive_webhook))
}

fn channel(state: &AppState) -> Result<Arc<MessengerChannel>, ServerError> {
    state
        .messenger
        .clone()
        .ok_or_else(|| ServerError::NotFound("Messenger channel is not configured".into()))
}

/// Messenger subscription handshake.
///
/// Echoes `hub.challenge` when `hub.mode=subscribe` and `hub.verify_token`
/// matches the configured token.
#[utoipa::path(
    get,
    path = "/webhook",
    tag = "webhooks",
    params(
        ("hub.mode" = Option<String>, Query, description = "Must be `subscribe`"),
        ("hub.verify_token" = Option<String>, Query, description = "Configured verify token"),
        ("hub.challenge" = Option<String>, Query, description = "Value to echo back"),
    ),
    responses(
        (status = 200, description = "Challenge echoed", body = String),
        (status = 403, description = "Verification failed"),
    )
)]
pub async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, ServerError> {
    let messenger = channel(&state)?;
    let challenge = messenger.verify_subscription(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
    );
    match challenge {
        Some(challenge) => {
            info!("messenger webhook verified");
            Ok(challenge.to_owned())
        }
        None => Err(ServerError::Forbidden("invalid webhook verification token".into())),
    }
}

/// Messenger event delivery.
///
/// Acknowledges immediately and relays text messages in the background.
/// Non-`page` objects are acknowledged and ignored.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "webhooks",
    request_body(content = String, description = "Messenger webhook body", content_type = "application/json"),
    responses(
        (status = 200, description = "Accepted", body = String),
        (status = 400, description = "Invalid signature or malformed body"),
        (status = 404, description = "Messenger is not configured"),
    )
)]
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ServerError> {
    let messenger = channel(&state)?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if !messenger.verify_signature(signature, &body) {
        warn!("rejecting Messenger webhook with bad signature");
        return Err(ServerError::BadRequest("invalid signature".into()));
    }

    let events = decode_events(&body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let channel: Arc<dyn ChannelAdapter> = messenger;
    state.relay.spawn_batch(channel, events);
    Ok("EVENT_RECEIVED")
}

#[cfg(test)]
mod test {
    use crate::routes::build;
    use crate::testing::{test_state, MESSENGER_VERIFY_TOKEN};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get(uri: String) -> (StatusCode, String) {
        let resp = build(test_state().await)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn handshake_echoes_challenge() {
        let (status, body) = get(format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={MESSENGER_VERIFY_TOKEN}&hub.challenge=1158201444"
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "1158201444");
    }

    #[tokio::test]
    async fn handshake_with_wrong_token_is_forbidden() {
        let (status, _) =
            get("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1".to_owned()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn non_page_delivery_is_acknowledged() {
        let resp = build(test_state().await)
            .oneshot(
                Request::post("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"object":"user","entry":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_delivery_is_rejected() {
        let resp = build(test_state().await)
            .oneshot(Request::post("/webhook").body(Body::from("not json")).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
