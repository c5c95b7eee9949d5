use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{health, query, sessions};
use crate::state::AppState;

/// Creates the application router: health, query/upload, and session
/// endpoints behind CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_static(
            "http://localhost:5173",
        )))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health::health))
        .route("/api/query", post(query::process_query))
        .route("/api/upload", post(query::upload_knowledge_base))
        .route(
            "/api/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/api/sessions/:session_id",
            get(sessions::get_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route(
            "/api/sessions/:session_id/messages",
            get(sessions::get_session_messages),
        )
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
