use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::routes::{admin, health, line, messenger};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(info(
    title = "relay-server",
    description = "LINE / Messenger customer-service relay",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(line::LineApi::openapi());
    root.merge(messenger::MessengerApi::openapi());
    root.merge(admin::AdminApi::openapi());
    root
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api-docs/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(get_docs())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = get_docs();
        for path in [
            "/health",
            "/callback",
            "/webhook",
            "/admin/users/{user_id}/history",
            "/admin/history/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
