//! `ragchat search`: retrieval without the language model.
//!
//! Embeds the query, runs the store's k-NN search with an optional
//! exact-match filter, and prints ranked chunks.

use anyhow::Result;

use rag_chat_core::models::ScoredChunk;

use crate::context::AppContext;
use crate::responder::RetrievalOptions;

pub async fn run_search(ctx: &AppContext, query: &str, options: &RetrievalOptions) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let results = ctx.responder.retrieve(query, options).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in results.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &ScoredChunk) {
    println!(
        "{}. [{:.3}] {}",
        rank,
        hit.score,
        hit.chunk.source().unwrap_or("(unknown)")
    );
    for (key, value) in &hit.chunk.metadata {
        if key == "source" {
            continue;
        }
        match value.as_str() {
            Some(s) => println!("    {}: {}", key, s),
            None => println!("    {}: {}", key, value),
        }
    }
    println!(
        "    excerpt: \"{}\"",
        hit.chunk.text.replace('\n', " ").trim()
    );
    println!("    id: {}", hit.id);
    println!();
}
