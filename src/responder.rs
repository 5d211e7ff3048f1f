//! Retrieval-augmented responder.
//!
//! One code path serves both complete and streamed answers:
//!
//! 1. Translate chat history into alternating model turns.
//! 2. Embed the last user turn and retrieve up to `k` chunks.
//! 3. Render the prompt template in place of the last user turn.
//! 4. Call the model, either for a complete answer or a fragment stream,
//!    depending on [`ResponseMode`].

use std::sync::Arc;

use serde::Serialize;

use rag_chat_core::chat::{last_user_index, to_model_messages, ChatMessage};
use rag_chat_core::embedding::Embedder;
use rag_chat_core::models::ScoredChunk;
use rag_chat_core::prompt::PromptTemplate;
use rag_chat_core::search::MetadataFilter;
use rag_chat_core::store::VectorStore;
use rag_chat_core::{RagError, Result};

use crate::llm::{ChatModel, ChunkReceiver, ModelRequest, StreamChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Complete,
    Stream,
}

#[derive(Debug, Clone)]
pub struct ResponderSettings {
    pub k: usize,
    pub template: PromptTemplate,
    pub system_prompt: Option<String>,
}

/// Per-request retrieval overrides.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub filter: Option<MetadataFilter>,
    pub k: Option<usize>,
}

/// A retrieved chunk as reported alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: String,
    pub source: Option<String>,
    pub score: f32,
}

impl From<&ScoredChunk> for Source {
    fn from(hit: &ScoredChunk) -> Self {
        Self {
            id: hit.id.clone(),
            source: hit.chunk.source().map(str::to_string),
            score: hit.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Source>,
}

pub enum Reply {
    Complete(Answer),
    Stream(ReplyStream),
}

/// Ordered, finite fragment stream for one answer.
///
/// [`next`](ReplyStream::next) yields fragments in arrival order and
/// returns `None` once the model signalled the end. A model stream that
/// stops without that signal yields one error instead. Dropping the
/// stream cancels the model call.
pub struct ReplyStream {
    pub sources: Vec<Source>,
    receiver: ChunkReceiver,
    finished: bool,
}

impl ReplyStream {
    pub fn new(receiver: ChunkReceiver, sources: Vec<Source>) -> Self {
        Self {
            sources,
            receiver,
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Option<Result<String>> {
        if self.finished {
            return None;
        }
        match self.receiver.recv().await {
            Some(Ok(StreamChunk::Text(text))) => Some(Ok(text)),
            Some(Ok(StreamChunk::End)) => {
                self.finished = true;
                None
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                Some(Err(RagError::model("model stream closed without an end marker")))
            }
        }
    }

    /// Drain the stream into a complete answer.
    pub async fn collect(mut self) -> Result<Answer> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(Answer {
            text,
            sources: self.sources,
        })
    }
}

pub struct Responder {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    settings: ResponderSettings,
}

impl Responder {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        settings: ResponderSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            settings,
        }
    }

    /// Embed `query` and return the top chunks.
    pub async fn retrieve(&self, query: &str, options: &RetrievalOptions) -> Result<Vec<ScoredChunk>> {
        let k = options.k.unwrap_or(self.settings.k);
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(query).await?;
        self.store
            .search(&vector.vector, k, options.filter.as_ref())
            .await
    }

    /// Build the model request for a conversation: retrieved context is
    /// rendered into the last user turn, later turns are discarded.
    pub async fn prepare(
        &self,
        messages: &[ChatMessage],
        options: &RetrievalOptions,
    ) -> Result<(ModelRequest, Vec<Source>)> {
        let mut turns = to_model_messages(messages)?;
        let last = last_user_index(&turns)
            .ok_or_else(|| RagError::invalid_request("conversation has no user message"))?;
        turns.truncate(last + 1);

        let question = turns[last].content.clone();
        let hits = self.retrieve(&question, options).await?;
        tracing::debug!(hits = hits.len(), "retrieved context");
        turns[last].content = self.settings.template.render(&hits, &question);

        let request = ModelRequest {
            system: self.settings.system_prompt.clone(),
            messages: turns,
        };
        Ok((request, hits.iter().map(Source::from).collect()))
    }

    pub async fn respond(
        &self,
        messages: &[ChatMessage],
        options: &RetrievalOptions,
        mode: ResponseMode,
    ) -> Result<Reply> {
        let (request, sources) = self.prepare(messages, options).await?;
        match mode {
            ResponseMode::Complete => {
                let text = self.model.complete(&request).await?;
                Ok(Reply::Complete(Answer { text, sources }))
            }
            ResponseMode::Stream => {
                let receiver = self.model.stream(&request).await?;
                Ok(Reply::Stream(ReplyStream::new(receiver, sources)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_chat_core::chat::ModelMessage;
    use rag_chat_core::models::{Chunk, Embedding, IndexedRecord, Metadata};
    use rag_chat_core::store::memory::InMemoryStore;
    use rag_chat_core::store::BuildInfo;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("loop") {
                        Embedding::new(vec![1.0, 0.0])
                    } else {
                        Embedding::new(vec![0.0, 1.0])
                    }
                })
                .collect())
        }
    }

    /// Records the last request and answers with fixed fragments.
    struct EchoModel {
        seen: Mutex<Option<ModelRequest>>,
    }

    #[async_trait]
    impl ChatModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }
        async fn complete(&self, request: &ModelRequest) -> Result<String> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok("answer".into())
        }
        async fn stream(&self, request: &ModelRequest) -> Result<ChunkReceiver> {
            *self.seen.lock().unwrap() = Some(request.clone());
            let (tx, rx) = mpsc::channel(4);
            tx.send(Ok(StreamChunk::Text("ans".into()))).await.unwrap();
            tx.send(Ok(StreamChunk::Text("wer".into()))).await.unwrap();
            tx.send(Ok(StreamChunk::End)).await.unwrap();
            Ok(rx)
        }
    }

    async fn responder() -> (Responder, Arc<EchoModel>) {
        let store = Arc::new(InMemoryStore::new());
        let mut loops = Metadata::new();
        loops.insert("source".into(), "loops.md".into());
        store
            .add_records(
                &[
                    IndexedRecord::new(
                        Chunk::new("for loops repeat", loops, Some(0)),
                        Embedding::new(vec![1.0, 0.0]),
                    ),
                    IndexedRecord::new(
                        Chunk::new("traits define behaviour", Metadata::new(), Some(0)),
                        Embedding::new(vec![0.0, 1.0]),
                    ),
                ],
                &BuildInfo {
                    embedding_model: "axis".into(),
                    dims: 2,
                    built_at: 0,
                },
            )
            .await
            .unwrap();
        let model = Arc::new(EchoModel {
            seen: Mutex::new(None),
        });
        let responder = Responder::new(
            store,
            Arc::new(AxisEmbedder),
            model.clone(),
            ResponderSettings {
                k: 1,
                template: PromptTemplate::default(),
                system_prompt: Some("be brief".into()),
            },
        );
        (responder, model)
    }

    #[tokio::test]
    async fn test_complete_answer_with_sources() {
        let (responder, model) = responder().await;
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("what is a loop?"),
        ];
        let reply = responder
            .respond(&history, &RetrievalOptions::default(), ResponseMode::Complete)
            .await
            .unwrap();
        let Reply::Complete(answer) = reply else {
            panic!("expected complete reply");
        };
        assert_eq!(answer.text, "answer");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source.as_deref(), Some("loops.md"));

        let request = model.seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0], ModelMessage::user("hi"));
        assert_eq!(request.messages[1], ModelMessage::assistant("hello"));
        assert!(request.messages[2].content.contains("Context: for loops repeat"));
        assert!(request.messages[2].content.contains("Question: what is a loop?"));
    }

    #[tokio::test]
    async fn test_stream_and_complete_share_prompt() {
        let (responder, model) = responder().await;
        let history = vec![ChatMessage::user("traits?")];
        responder
            .respond(&history, &RetrievalOptions::default(), ResponseMode::Complete)
            .await
            .unwrap();
        let complete_request = model.seen.lock().unwrap().clone();

        let reply = responder
            .respond(&history, &RetrievalOptions::default(), ResponseMode::Stream)
            .await
            .unwrap();
        let Reply::Stream(stream) = reply else {
            panic!("expected stream reply");
        };
        assert_eq!(*model.seen.lock().unwrap(), complete_request);
        let answer = stream.collect().await.unwrap();
        assert_eq!(answer.text, "answer");
    }

    #[tokio::test]
    async fn test_trailing_assistant_turn_dropped() {
        let (responder, _model) = responder().await;
        let history = vec![ChatMessage::user("loop"), ChatMessage::assistant("partial")];
        let (request, _) = responder
            .prepare(&history, &RetrievalOptions::default())
            .await
            .unwrap();
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_no_user_turn_is_invalid() {
        let (responder, _model) = responder().await;
        let err = responder
            .prepare(&[ChatMessage::assistant("x")], &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_stream_without_end_marker_errors() {
        let (tx, rx) = mpsc::channel(2);
        tx.send(Ok(StreamChunk::Text("a".into()))).await.unwrap();
        drop(tx);
        let mut stream = ReplyStream::new(rx, Vec::new());
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
