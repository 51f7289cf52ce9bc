//! HTTP server side: a dispatcher behind an axum router.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;

use super::Dispatcher;

/// Router serving `dispatcher` on `POST /`.
///
/// Requests are answered `200` with the JSON response body; notifications
/// get `204 No Content`.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", post(handle))
        .with_state(dispatcher)
}

async fn handle(State(dispatcher): State<Arc<Dispatcher>>, body: String) -> Response {
    // ---
    match dispatcher.handle_text(&body).await {
        Some(reply) => ([(header::CONTENT_TYPE, "application/json")], reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
