//! HTTP chat server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer a conversation, as JSON or an event stream |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # `POST /api/chat`
//!
//! ```json
//! { "messages": [{ "role": "user", "content": "What is a loop?" }],
//!   "stream": false,
//!   "filter": { "semester": "1st" } }
//! ```
//!
//! `stream` defaults to `[server].stream`. A JSON answer looks like
//! `{ "id", "role": "assistant", "content", "sources": [...] }`. A streamed
//! answer is `text/event-stream` carrying `start`, `text-start`,
//! `text-delta`..., `text-end`, `finish`, then `data: [DONE]`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "messages must not be empty" } }
//! ```
//!
//! | Error | Status | Code |
//! |-------|--------|------|
//! | invalid request | 400 | `bad_request` |
//! | embedding failure | 502 | `embedding_error` |
//! | model failure | 502 | `model_error` |
//! | store, load, split failure | 500 | `internal` |
//!
//! Failures after a stream has started are sent as one `error` event and
//! the stream ends without `finish`.
//!
//! # CORS
//!
//! Origins come from `[server].cors_origins` (`"*"` allows any); all
//! methods and headers are permitted.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use rag_chat_core::chat::ChatMessage;
use rag_chat_core::search::MetadataFilter;
use rag_chat_core::stream::{StreamEvent, StreamFramer, DONE_MARKER, STREAM_HEADER};
use rag_chat_core::RagError;

use crate::context::AppContext;
use crate::responder::{Reply, ReplyStream, ResponseMode, RetrievalOptions, Source};

/// Build the router. Split out from [`run_server`] so tests can serve it on
/// their own listener.
pub fn router(ctx: Arc<AppContext>) -> anyhow::Result<Router> {
    let cors = cors_layer(&ctx.config.server.cors_origins)?;
    Ok(Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(ctx))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| anyhow::anyhow!("invalid server.cors_origins entry: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "chat server listening");
    println!("chat server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
            RagError::Model(_) => (StatusCode::BAD_GATEWAY, "model_error"),
            RagError::Store(_) | RagError::Load(_) | RagError::Split(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "chat request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
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

// ============ POST /api/chat ============

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub filter: Option<MetadataFilter>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub role: &'static str,
    pub content: String,
    pub sources: Vec<Source>,
}

async fn handle_chat(
    State(ctx): State<Arc<AppContext>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload.map_err(|e| bad_request(e.body_text()))?;
    if request.messages.is_empty() {
        return Err(bad_request("messages must not be empty"));
    }

    let streaming = request.stream.unwrap_or(ctx.config.server.stream);
    let mode = if streaming {
        ResponseMode::Stream
    } else {
        ResponseMode::Complete
    };
    let options = RetrievalOptions {
        filter: request.filter.filter(|f| !f.is_empty()),
        k: None,
    };

    let message_id = Uuid::new_v4().to_string();
    match ctx.responder.respond(&request.messages, &options, mode).await? {
        Reply::Complete(answer) => Ok(Json(ChatResponse {
            id: message_id,
            role: "assistant",
            content: answer.text,
            sources: answer.sources,
        })
        .into_response()),
        Reply::Stream(reply) => {
            let sse = Sse::new(event_stream(reply, StreamFramer::new(message_id)));
            Ok(([STREAM_HEADER], sse).into_response())
        }
    }
}

enum Frame {
    Event(StreamEvent),
    Done,
}

struct StreamState {
    reply: ReplyStream,
    framer: StreamFramer,
    queue: VecDeque<Frame>,
    done: bool,
}

/// Frame a reply as SSE events. Dropping the returned stream (client
/// disconnect) drops the reply and with it the model connection.
fn event_stream(
    reply: ReplyStream,
    mut framer: StreamFramer,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let queue = framer.open().into_iter().map(Frame::Event).collect();
    let state = StreamState {
        reply,
        framer,
        queue,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(frame) = state.queue.pop_front() {
                return Some((Ok(to_sse(frame)), state));
            }
            if state.done {
                return None;
            }
            match state.reply.next().await {
                Some(Ok(fragment)) => {
                    let events = state.framer.delta(&fragment);
                    state.queue.extend(events.into_iter().map(Frame::Event));
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "stream failed after start");
                    let events = state.framer.error(e.to_string());
                    state.queue.extend(events.into_iter().map(Frame::Event));
                    state.done = true;
                }
                None => {
                    let events = state.framer.finish();
                    state.queue.extend(events.into_iter().map(Frame::Event));
                    state.queue.push_back(Frame::Done);
                    state.done = true;
                }
            }
        }
    })
}

fn to_sse(frame: Frame) -> Event {
    match frame {
        Frame::Event(event) => match serde_json::to_string(&event) {
            Ok(json) => Event::default().data(json),
            Err(e) => Event::default().data(
                serde_json::json!({"type": "error", "errorText": e.to_string()}).to_string(),
            ),
        },
        Frame::Done => Event::default().data(DONE_MARKER),
    }
}
