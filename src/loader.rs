//! Document loaders: a filesystem walker and a web page fetcher.
//!
//! Both produce [`Document`]s whose metadata always carries `source`.
//!
//! # Filesystem
//!
//! Walks `loader.root`, keeping files that match `include_globs` and none of
//! `exclude_globs` (plus the built-in excludes for `.git`, `target` and
//! `node_modules`). Globs match the path relative to the root. Documents are
//! sorted by relative path. Files that are not valid UTF-8 are skipped with
//! a warning.
//!
//! # Web
//!
//! Fetches each URL and keeps the text of elements carrying one of the
//! configured classes (the whole `<body>` when none are configured).

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use scraper::{ElementRef, Html, Selector};
use walkdir::WalkDir;

use rag_chat_core::models::Document;
use rag_chat_core::{RagError, Result};

use crate::config::LoaderConfig;

/// Load every configured source: the filesystem root, then the URLs.
pub async fn load_all(config: &LoaderConfig) -> Result<Vec<Document>> {
    if config.root.is_none() && config.urls.is_empty() {
        return Err(RagError::load(
            "no sources configured: set loader.root or loader.urls",
        ));
    }

    let mut docs = Vec::new();
    if let Some(root) = &config.root {
        docs.extend(load_directory(root, config)?);
    }
    if !config.urls.is_empty() {
        docs.extend(load_web(&config.urls, &config.html_classes, config.timeout_secs).await?);
    }
    Ok(docs)
}

pub fn load_directory(root: &Path, config: &LoaderConfig) -> Result<Vec<Document>> {
    if !root.exists() {
        return Err(RagError::load(format!(
            "loader root does not exist: {}",
            root.display()
        )));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&default_excludes)?;

    let mut docs: Vec<(String, Document)> = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry.map_err(|e| RagError::load(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(path = %path.display(), "skipping file that is not valid UTF-8");
                continue;
            }
            Err(e) => {
                return Err(RagError::load(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mut doc = Document::new(path.to_string_lossy(), text);
        if let Some(name) = path.file_name() {
            doc = doc.with_metadata("file_name", name.to_string_lossy().to_string());
        }
        if let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) {
            let modified: DateTime<Utc> = modified.into();
            doc = doc.with_metadata("modified", modified.to_rfc3339());
        }
        docs.push((rel_str, doc));
    }

    if docs.is_empty() {
        return Err(RagError::load(format!(
            "no files under {} match {:?}",
            root.display(),
            config.include_globs
        )));
    }

    docs.sort_by(|a, b| a.0.cmp(&b.0));
    tracing::debug!(root = %root.display(), files = docs.len(), "loaded documents");
    Ok(docs.into_iter().map(|(_, d)| d).collect())
}

pub async fn load_web(urls: &[String], classes: &[String], timeout_secs: u64) -> Result<Vec<Document>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::load(e.to_string()))?;

    let mut docs = Vec::with_capacity(urls.len());
    for url in urls {
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::load(format!("failed to fetch {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RagError::load(format!("failed to fetch {}: HTTP {}", url, status)));
        }
        let html = response
            .text()
            .await
            .map_err(|e| RagError::load(format!("failed to read {}: {}", url, e)))?;

        let text = extract_html_text(&html, classes)?;
        if text.is_empty() {
            tracing::warn!(%url, "page has no text in the configured elements");
        }
        docs.push(Document::new(url.clone(), text));
    }
    Ok(docs)
}

/// Text of every element carrying one of `classes`, outermost matches
/// only, in document order, one paragraph per element. With no classes the
/// whole body is returned.
pub fn extract_html_text(html: &str, classes: &[String]) -> Result<String> {
    let document = Html::parse_document(html);

    if classes.is_empty() {
        let body = Selector::parse("body").map_err(|e| RagError::load(e.to_string()))?;
        return Ok(document
            .select(&body)
            .next()
            .map(|b| collapse_whitespace(b.text()))
            .unwrap_or_default());
    }

    let has_class =
        |el: &ElementRef<'_>| el.value().classes().any(|c| classes.iter().any(|k| k == c));

    let fragments: Vec<String> = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| has_class(el))
        .filter(|el| !el.ancestors().filter_map(ElementRef::wrap).any(|a| has_class(&a)))
        .map(|el| collapse_whitespace(el.text()))
        .filter(|t| !t.is_empty())
        .collect();

    Ok(fragments.join("\n\n"))
}

fn collapse_whitespace<'a>(pieces: impl Iterator<Item = &'a str>) -> String {
    let mut buf = String::new();
    for piece in pieces {
        for word in piece.split_whitespace() {
            if !buf.is_empty() {
                buf.push(' ');
            }
            buf.push_str(word);
        }
    }
    buf
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern)
                .map_err(|e| RagError::load(format!("invalid glob '{}': {}", pattern, e)))?,
        );
    }
    builder.build().map_err(|e| RagError::load(e.to_string()))
}
