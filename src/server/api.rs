use crate::relay::{ Relay, RelayError };

use axum::{
    routing::{ get, post },
    Router,
    body::{ Body, Bytes },
    extract::State,
    response::{ Html, IntoResponse, Response },
    http::{ header, StatusCode },
};
use futures::StreamExt;
use log::warn;
use tower_http::cors::{ Any, CorsLayer };

const WIDGET_HTML: &str = include_str!("../../static/index.html");

#[derive(Clone)]
struct AppState {
    relay: Relay,
}

pub fn router(relay: Relay) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(widget_handler))
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(cors)
        .with_state(AppState { relay })
}

/// Any failure before the first byte is reported the same way; the cause is only logged.
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// `POST /api/chat`: streams the assistant reply as raw text fragments.
///
/// A failure after the first byte aborts the body instead of ending it cleanly.
async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Result<Response, RelayError> {
    let messages = Relay::parse_request(&body).map_err(|e| {
        warn!("Rejecting /api/chat body: {}", e);
        e
    })?;
    let fragments = state.relay.open(messages).await?;
    let body = Body::from_stream(fragments.map(|item| item.map(Bytes::from)));

    Ok(
        (
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            body,
        ).into_response()
    )
}

async fn widget_handler() -> Html<&'static str> {
    Html(WIDGET_HTML)
}

async fn health_handler() -> &'static str {
    "ok"
}
