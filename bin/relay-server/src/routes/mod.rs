//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - per-request trace-ID middleware
//! - LINE (`/callback`) and Messenger (`/webhook`) webhooks
//! - health route and the OpenAPI document
//! - `/admin` routes (optionally protected by bearer token)

mod admin;
pub mod doc;
mod health;
mod line;
mod messenger;

use axum::{middleware, Router};
use std::sync::Arc;

use crate::middleware::trace;
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(doc::router())
        .merge(line::router())
        .merge(messenger::router())
        .nest("/admin", admin::router(state.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn responses_carry_a_trace_id() {
        let app = build(test_state().await);
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key(trace::X_TRACE_ID));
    }

    #[tokio::test]
    async fn incoming_trace_id_is_propagated() {
        let app = build(test_state().await);
        let id = "3f2504e0-4f89-41d3-9a0c-0305e82c3301";
        let resp = app
            .oneshot(
                Request::get("/health")
                    .header(trace::X_TRACE_ID, id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.headers()[trace::X_TRACE_ID], id);
    }

    #[tokio::test]
    #[traced_test]
    async fn webhook_bodies_stay_out_of_the_logs() {
        let app = build(test_state().await);
        let resp = app
            .oneshot(
                Request::post("/callback")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"events":[{"type":"message","message":{"type":"text","text":"call me on 0812345678"}}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(resp.headers().contains_key(trace::X_TRACE_ID));
        assert!(!logs_contain("0812345678"));
        assert!(logs_contain("request rejected"));
        assert!(logs_contain("invalid signature"));
    }
}
