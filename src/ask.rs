//! `ragchat ask` and `ragchat chat`.
//!
//! `ask` answers one question. `chat` is a line-based REPL that keeps the
//! conversation history and streams each answer as it arrives. Both go
//! through the same [`Responder`](crate::responder::Responder) the HTTP
//! server uses.

use std::io::Write as _;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use rag_chat_core::chat::ChatMessage;

use crate::context::AppContext;
use crate::responder::{Answer, Reply, ReplyStream, ResponseMode, RetrievalOptions, Source};

pub async fn run_ask(
    ctx: &AppContext,
    question: &str,
    options: &RetrievalOptions,
    stream: bool,
) -> Result<()> {
    let history = vec![ChatMessage::user(question)];
    let mode = if stream {
        ResponseMode::Stream
    } else {
        ResponseMode::Complete
    };
    let answer = match ctx.responder.respond(&history, options, mode).await? {
        Reply::Complete(answer) => {
            println!("{}", answer.text);
            answer
        }
        Reply::Stream(reply) => print_stream(reply).await?,
    };
    print_sources(&answer.sources);
    Ok(())
}

/// Print fragments as they arrive and return the assembled answer.
async fn print_stream(mut reply: ReplyStream) -> Result<Answer> {
    let mut text = String::new();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = reply.next().await {
        let fragment = fragment?;
        print!("{}", fragment);
        stdout.flush()?;
        text.push_str(&fragment);
    }
    println!();
    Ok(Answer {
        text,
        sources: reply.sources,
    })
}

fn print_sources(sources: &[Source]) {
    if sources.is_empty() {
        return;
    }
    println!();
    println!("sources:");
    for source in sources {
        println!(
            "  [{:.3}] {}",
            source.score,
            source.source.as_deref().unwrap_or(&source.id)
        );
    }
}

pub async fn run_chat(ctx: &AppContext, options: &RetrievalOptions) -> Result<()> {
    println!("ragchat: ask a question (empty line or Ctrl-D to quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        history.push(ChatMessage::user(line));
        let reply = ctx
            .responder
            .respond(&history, options, ResponseMode::Stream)
            .await;
        let answer = match reply {
            Ok(Reply::Stream(reply)) => print_stream(reply).await,
            Ok(Reply::Complete(answer)) => {
                println!("{}", answer.text);
                Ok(answer)
            }
            Err(e) => Err(e.into()),
        };
        match answer {
            Ok(answer) => history.push(ChatMessage::assistant(answer.text)),
            Err(e) => {
                // Keep the session going; the failed question stays out of history.
                eprintln!("Error: {:#}", e);
                history.pop();
            }
        }
    }

    Ok(())
}
