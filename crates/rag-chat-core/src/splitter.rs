//! Document → chunk pipeline stage.
//!
//! A [`Splitter`] combines one splitting strategy with the metadata
//! enrichment shared by both strategies: front-matter fields, path tags,
//! the derived topic, and optional labelling of chunk text.
//!
//! All configuration is validated in [`Splitter::new`], before any document
//! is touched.
//!
//! Fixed-window splitting always runs over the whole document, front-matter
//! block included, so every byte lands in some chunk. Header splitting
//! starts after the block.

use crate::chunk::FixedWindow;
use crate::error::Result;
use crate::frontmatter;
use crate::markdown::{HeaderMarker, MarkdownHeaderSplitter, HEADER_PATH_KEY};
use crate::models::{Chunk, Document, Metadata};
use crate::tagging::{self, PathTag, TOPIC_KEY};

#[derive(Debug, Clone)]
pub enum SplitStrategy {
    FixedWindow {
        chunk_size: usize,
        chunk_overlap: usize,
    },
    MarkdownHeaders {
        headers: Vec<HeaderMarker>,
        strip_headers: bool,
    },
}

#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub strategy: SplitStrategy,
    /// Front-matter keys to lift into metadata. Empty disables front-matter
    /// handling entirely. Header splitting skips the block when keys are
    /// set; fixed windows keep it in the text either way.
    pub front_matter_keys: Vec<String>,
    pub path_tags: Vec<PathTag>,
    /// Prefix stripped from file stems to derive `topic`; `None` disables it.
    pub topic_prefix: Option<String>,
    /// Prefix each chunk's text with its tag values.
    pub label_chunks: bool,
}

impl SplitOptions {
    pub fn fixed_window(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::with_strategy(SplitStrategy::FixedWindow {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn markdown(headers: Vec<HeaderMarker>, strip_headers: bool) -> Self {
        Self::with_strategy(SplitStrategy::MarkdownHeaders {
            headers,
            strip_headers,
        })
    }

    fn with_strategy(strategy: SplitStrategy) -> Self {
        Self {
            strategy,
            front_matter_keys: Vec::new(),
            path_tags: Vec::new(),
            topic_prefix: None,
            label_chunks: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Engine {
    Fixed(FixedWindow),
    Markdown(MarkdownHeaderSplitter),
}

#[derive(Debug, Clone)]
pub struct Splitter {
    engine: Engine,
    front_matter_keys: Vec<String>,
    path_tags: Vec<PathTag>,
    topic_prefix: Option<String>,
    label_keys: Vec<String>,
}

impl Splitter {
    pub fn new(options: SplitOptions) -> Result<Self> {
        let engine = match options.strategy {
            SplitStrategy::FixedWindow {
                chunk_size,
                chunk_overlap,
            } => Engine::Fixed(FixedWindow::new(chunk_size, chunk_overlap)?),
            SplitStrategy::MarkdownHeaders {
                headers,
                strip_headers,
            } => Engine::Markdown(MarkdownHeaderSplitter::new(headers, strip_headers)?),
        };

        let label_keys = if options.label_chunks {
            let mut keys: Vec<String> = options.path_tags.iter().map(|t| t.key.clone()).collect();
            if options.topic_prefix.is_some() {
                keys.push(TOPIC_KEY.to_string());
            }
            keys
        } else {
            Vec::new()
        };

        Ok(Self {
            engine,
            front_matter_keys: options.front_matter_keys,
            path_tags: options.path_tags,
            topic_prefix: options.topic_prefix,
            label_keys,
        })
    }

    /// Split one document. Offsets are relative to `doc.raw_text` and
    /// non-decreasing.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        let text = doc.raw_text.as_str();

        let mut base = doc.metadata.clone();
        let body_start = if self.front_matter_keys.is_empty() {
            0
        } else {
            let fm = frontmatter::extract(text, &self.front_matter_keys);
            base.extend(fm.fields);
            fm.body_start
        };
        tagging::apply_tags(
            &mut base,
            &doc.source_path,
            &self.path_tags,
            self.topic_prefix.as_deref(),
        );
        let label = tagging::label_prefix(&base, &self.label_keys);

        match &self.engine {
            Engine::Fixed(fw) => fw
                .split(text)
                .into_iter()
                .map(|w| self.make_chunk(&label, w.text, base.clone(), w.start))
                .collect(),
            Engine::Markdown(md) => md
                .split(&text[body_start..])
                .into_iter()
                .map(|section| {
                    let mut metadata = base.clone();
                    if let Some(path) = section.header_path() {
                        metadata.insert(HEADER_PATH_KEY.to_string(), path.into());
                    }
                    for (name, title) in &section.headers {
                        metadata.insert(name.clone(), title.clone().into());
                    }
                    self.make_chunk(&label, section.text, metadata, body_start + section.start)
                })
                .collect(),
        }
    }

    pub fn split_all(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter().flat_map(|d| self.split_document(d)).collect()
    }

    fn make_chunk(&self, label: &str, span: &str, metadata: Metadata, start: usize) -> Chunk {
        let text = if label.is_empty() {
            span.to_string()
        } else {
            format!("{}{}", label, span)
        };
        Chunk::new(text, metadata, Some(start))
    }
}
