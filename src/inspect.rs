//! Index inspection.
//!
//! Prints what the persisted store holds: record count, completion state,
//! when and with which embedding model it was built, and the first few
//! records. Used by `ragchat inspect` to check an ingest before serving.

use anyhow::Result;

use rag_chat_core::models::IndexedRecord;
use rag_chat_core::store::VectorStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

const EXCERPT_CHARS: usize = 80;

/// Run the inspect command. Never creates a store that does not exist.
pub async fn run_inspect(config: &Config, limit: usize) -> Result<()> {
    let db_path = config.store.db_path();
    let Some(store) = SqliteStore::open_existing(&config.store.dir).await? else {
        println!("inspect");
        println!("  store: {} (not built)", config.store.dir.display());
        println!("  run `ragchat ingest` first");
        return Ok(());
    };

    let info = store.info().await?;
    let sample = store.sample(limit).await?;
    store.close().await;

    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("inspect");
    println!("  store:      {}", db_path.display());
    println!("  size:       {}", format_bytes(db_size));
    println!("  records:    {}", info.records);
    println!(
        "  complete:   {}",
        if info.complete { "yes" } else { "no" }
    );
    println!(
        "  built at:   {}",
        info.built_at.map(format_ts).unwrap_or_else(|| "never".to_string())
    );
    println!(
        "  model:      {}",
        info.embedding_model.as_deref().unwrap_or("-")
    );
    println!(
        "  dims:       {}",
        info.dims.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    );

    if !sample.is_empty() {
        println!();
        println!("  sample:");
        for record in &sample {
            print_record(record);
        }
    }

    Ok(())
}

fn print_record(record: &IndexedRecord) {
    println!("  - id: {}", record.id);
    println!(
        "    source: {}",
        record.chunk.source().unwrap_or("(unknown)")
    );
    let tags: Vec<String> = record
        .chunk
        .metadata
        .iter()
        .filter(|(k, _)| k.as_str() != "source")
        .map(|(k, v)| match v.as_str() {
            Some(s) => format!("{}={}", k, s),
            None => format!("{}={}", k, v),
        })
        .collect();
    if !tags.is_empty() {
        println!("    metadata: {}", tags.join(", "));
    }
    println!("    excerpt: \"{}\"", excerpt(&record.chunk.text));
}

/// First line-folded characters of a chunk.
fn excerpt(text: &str) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat.to_string();
    }
    let mut cut: String = flat.chars().take(EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_truncates_on_chars() {
        assert_eq!(excerpt("short\ntext"), "short text");
        let long = "é".repeat(100);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(10), "10 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
    }

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00 UTC");
    }
}
