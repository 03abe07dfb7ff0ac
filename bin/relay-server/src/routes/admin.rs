//! Administrative routes nested under `/admin`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{middleware, Json, Router};
use tracing::info;
use utoipa::OpenApi;

use crate::entities::ChatStore;
use crate::error::ServerError;
use crate::middleware::auth;
use crate::schemas::admin::TurnResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_user_history, delete_history_turn),
    components(schemas(TurnResponse))
)]
pub struct AdminApi;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/{user_id}/history", get(list_user_history))
        .route("/history/{id}", delete(delete_history_turn))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

#[utoipa::path(
    get,
    path = "/admin/users/{user_id}/history",
    tag = "admin",
    params(("user_id" = String, Path, description = "Channel user id")),
    responses(
        (status = 200, description = "Every stored turn for the user", body = Vec<TurnResponse>),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 500, description = "Database error"),
    )
)]
pub async fn list_user_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<TurnResponse>>, ServerError> {
    let turns = state.store.read_turns(&user_id).await?;
    Ok(Json(turns.iter().map(|t| t.to_response()).collect()))
}

#[utoipa::path(
    delete,
    path = "/admin/history/{id}",
    tag = "admin",
    params(("id" = i64, Path, description = "Row id")),
    responses(
        (status = 204, description = "Turn deleted"),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 404, description = "No such turn"),
    )
)]
pub async fn delete_history_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServerError> {
    if state.store.delete_turn(id).await? {
        info!(id, "deleted history turn");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotFound(format!("history turn {id} not found")))
    }
}

#[cfg(test)]
mod test {
    use crate::entities::{ChatStore, UserRecord, UserStore};
    use crate::routes::build;
    use crate::testing::{test_state, test_state_with_admin_token};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use relay_agent::Role;
    use tower::ServiceExt;

    #[tokio::test]
    async fn lists_history_in_order() {
        let state = test_state().await;
        state.store.upsert_user(&UserRecord::new("U1", "Ann")).await.unwrap();
        state.store.insert_turn("U1", Role::User, "Hi", Some("1")).await.unwrap();
        state.store.insert_turn("U1", Role::Assistant, "Hello", Some("1")).await.unwrap();

        let resp = build(state)
            .oneshot(Request::get("/admin/users/U1/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body[0]["role"], "user");
        assert_eq!(body[1]["content"], "Hello");
        assert_eq!(body[1]["channel_timestamp"], "1");
    }

    #[tokio::test]
    async fn delete_then_delete_again_is_404() {
        let state = test_state().await;
        state.store.upsert_user(&UserRecord::new("U1", "Ann")).await.unwrap();
        let id = state.store.insert_turn("U1", Role::User, "Hi", None).await.unwrap();
        let app = build(state);

        let req = || Request::delete(format!("/admin/history/{id}")).body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(req()).await.unwrap().status(), StatusCode::NO_CONTENT);
        assert_eq!(app.oneshot(req()).await.unwrap().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_token_is_enforced_when_set() {
        let app = build(test_state_with_admin_token("s3cret").await);

        let anonymous = Request::get("/admin/users/U1/history").body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(anonymous).await.unwrap().status(), StatusCode::UNAUTHORIZED);

        let authorised = Request::get("/admin/users/U1/history")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.oneshot(authorised).await.unwrap().status(), StatusCode::OK);
    }
}
