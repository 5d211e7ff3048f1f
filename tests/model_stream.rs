//! Streaming client against a local fake of the Messages API.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures_util::stream;
use serde_json::json;
use tokio::sync::mpsc;

use rag_chat::config::ModelConfig;
use rag_chat::llm::{AnthropicModel, ChatModel, ChunkReceiver, ModelRequest, StreamChunk};
use rag_chat_core::chat::ModelMessage;

/// Sends on drop; the server's response body owns one, so the signal fires
/// when the server stops producing for a connection.
struct BodyDropped(mpsc::UnboundedSender<()>);

impl Drop for BodyDropped {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

#[derive(Clone)]
struct Script {
    interval: Duration,
    /// Text deltas before `message_stop`; `None` never stops.
    deltas: Option<usize>,
    /// Go silent after this many deltas.
    stall_after: Option<usize>,
    dropped: mpsc::UnboundedSender<()>,
}

fn delta_frame(i: usize) -> String {
    let data = json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": {"type": "text_delta", "text": format!("{} ", i)}
    });
    format!("event: content_block_delta\ndata: {}\n\n", data)
}

const STOP_FRAME: &str = "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n";

async fn messages(State(script): State<Script>) -> Response {
    let guard = BodyDropped(script.dropped.clone());
    let frames = stream::unfold((0usize, guard), move |(sent, guard)| {
        let script = script.clone();
        async move {
            if script.stall_after == Some(sent) {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(script.interval).await;
            let frame = match script.deltas {
                Some(n) if sent > n => return None,
                Some(n) if sent == n => STOP_FRAME.to_string(),
                _ => delta_frame(sent),
            };
            Some((Ok::<_, Infallible>(frame), (sent + 1, guard)))
        }
    });
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Serve `script` on an ephemeral port; the receiver reports dropped bodies.
async fn start_fake_api(
    interval: Duration,
    deltas: Option<usize>,
    stall_after: Option<usize>,
) -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(Script {
            interval,
            deltas,
            stall_after,
            dropped: tx,
        });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (addr, rx)
}

fn model(addr: SocketAddr, timeout_secs: u64) -> AnthropicModel {
    let config = ModelConfig {
        base_url: Some(format!("http://{}", addr)),
        timeout_secs,
        ..ModelConfig::default()
    };
    AnthropicModel::new(&config, Some("test-key".into())).unwrap()
}

fn request() -> ModelRequest {
    ModelRequest {
        system: None,
        messages: vec![ModelMessage::user("What is a loop?")],
    }
}

async fn next_chunk(rx: &mut ChunkReceiver) -> Option<rag_chat_core::Result<StreamChunk>> {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no stream item within 10 seconds")
}

#[tokio::test]
async fn test_dropping_receiver_releases_connection() {
    let (addr, mut dropped) = start_fake_api(Duration::from_millis(20), None, None).await;
    let model = model(addr, 30);

    let mut rx = model.stream(&request()).await.unwrap();
    assert_eq!(
        next_chunk(&mut rx).await.unwrap().unwrap(),
        StreamChunk::Text("0 ".into())
    );
    drop(rx);

    tokio::time::timeout(Duration::from_secs(5), dropped.recv())
        .await
        .expect("model connection still open 5 seconds after the consumer left")
        .unwrap();
}

#[tokio::test]
async fn test_stream_outlives_timeout_while_data_flows() {
    // Nine frames 250ms apart: about 2.25s in total against a 1s timeout.
    let (addr, _dropped) = start_fake_api(Duration::from_millis(250), Some(8), None).await;
    let model = model(addr, 1);

    let mut rx = model.stream(&request()).await.unwrap();
    let mut text = String::new();
    loop {
        match next_chunk(&mut rx).await {
            Some(Ok(StreamChunk::Text(t))) => text.push_str(&t),
            Some(Ok(StreamChunk::End)) => break,
            Some(Err(e)) => panic!("stream failed after {:?}: {}", text, e),
            None => panic!("stream closed without an end marker"),
        }
    }
    assert_eq!(text, "0 1 2 3 4 5 6 7 ");
}

#[tokio::test]
async fn test_silent_stream_times_out() {
    let (addr, _dropped) = start_fake_api(Duration::from_millis(20), None, Some(1)).await;
    let model = model(addr, 1);

    let mut rx = model.stream(&request()).await.unwrap();
    assert_eq!(
        next_chunk(&mut rx).await.unwrap().unwrap(),
        StreamChunk::Text("0 ".into())
    );
    let err = next_chunk(&mut rx).await.unwrap().unwrap_err();
    assert!(err.to_string().contains("stalled"), "{}", err);
    assert!(next_chunk(&mut rx).await.is_none());
}
