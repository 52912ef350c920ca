//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a question with its sources |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Failures return a non-2xx status with a JSON body:
//!
//! ```json
//! { "detail": "question must not be empty" }
//! ```
//!
//! | Status | Cause |
//! |--------|-------|
//! | 400 | empty question or malformed body |
//! | 502 | embedding service failure |
//! | 503 | index unavailable |
//! | 504 | generation timed out or failed after retry, or request timeout |
//!
//! All origins, methods, and headers are permitted (CORS) so browser
//! front-ends on other ports can call the API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use academic_rag_core::Error;

use crate::chat::{open_service, ChatAnswer, ChatService};
use crate::config::Config;

#[derive(Clone)]
struct AppState {
    chat: Arc<ChatService>,
    request_timeout: Duration,
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let (chat, _pool) = open_service(config).await?;
    let app = router(
        Arc::new(chat),
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let bind_addr = &config.server.bind;
    println!("arag server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(chat: Arc<ChatService>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState {
            chat,
            request_timeout,
        })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

struct AppError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, detail) = match &err {
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::IndexUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "The document index is unavailable. Run `arag ingest` and try again.".to_string(),
            ),
            Error::Embedding(_) | Error::GenerationRejected(_) => {
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
            Error::GenerationTimeout(_) | Error::Generation(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "The language model did not answer in time. Please try again.".to_string(),
            ),
            Error::Parse { .. } => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        warn!(error = %err, status = status.as_u16(), "chat request failed");
        AppError { status, detail }
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatAnswer>, AppError> {
    let Json(request) = body.map_err(|rejection| AppError {
        status: StatusCode::BAD_REQUEST,
        detail: rejection.body_text(),
    })?;
    info!(question_chars = request.question.len(), "chat request");

    match tokio::time::timeout(state.request_timeout, state.chat.answer(&request.question)).await
    {
        Ok(result) => Ok(Json(result?)),
        Err(_) => Err(AppError {
            status: StatusCode::GATEWAY_TIMEOUT,
            detail: format!(
                "Request timed out after {}s. Please try again.",
                state.request_timeout.as_secs()
            ),
        }),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::tests::{service, ScriptedModel};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app(outcomes: Vec<academic_rag_core::Result<String>>) -> Router {
        let chat = service(Arc::new(ScriptedModel::new(outcomes))).await;
        router(Arc::new(chat), Duration::from_secs(30))
    }

    async fn post_chat(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Vec::new())
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_chat_answer_and_sources() {
        let app = app(vec![Ok("Pasal 3 mengatur cuti akademik.".into())]).await;
        let (status, json) = post_chat(app, r#"{"question": "Apa isi Pasal 3?"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["answer"], "Pasal 3 mengatur cuti akademik.");
        assert_eq!(json["sources"][0], "peraturan-akademik.pdf (Page 1)");
    }

    #[tokio::test]
    async fn test_empty_question_is_400() {
        let (status, json) = post_chat(app(Vec::new()).await, r#"{"question": "  "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (status, json) = post_chat(app(Vec::new()).await, r#"{"q": 1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn test_rejected_generation_is_502() {
        let app = app(vec![Err(Error::GenerationRejected("HTTP 404: model not found".into()))]).await;
        let (status, json) = post_chat(app, r#"{"question": "Apa isi Pasal 1?"}"#).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["detail"].as_str().unwrap().contains("model not found"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_504() {
        let app = app(vec![
            Err(Error::GenerationTimeout(120)),
            Err(Error::Generation("model crashed".into())),
        ])
        .await;
        let (status, json) = post_chat(app, r#"{"question": "Apa isi Pasal 1?"}"#).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(json["detail"].as_str().unwrap().contains("try again"));
    }
}
