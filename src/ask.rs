//! Question answering commands: one-shot `mqa ask` and the interactive
//! `mqa chat` loop.

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Config;
use crate::models::Answer;
use crate::pipeline::QaPipeline;

/// Collection id used by the CLI session. Multi-collection routing belongs
/// to the callers that have real user/collection identity.
const CLI_COLLECTION: &str = "cli";

pub async fn run_ask(
    config: Config,
    question: &str,
    top_k: Option<usize>,
    show_sources: bool,
) -> Result<()> {
    let pipeline = QaPipeline::from_config(config).await?;
    let answer = pipeline.answer(CLI_COLLECTION, question, top_k).await?;
    print_answer(&answer, show_sources);
    pipeline.shutdown().await;
    Ok(())
}

pub async fn run_chat(config: Config, top_k: Option<usize>) -> Result<()> {
    let pipeline = QaPipeline::from_config(config).await?;
    println!(
        "chat with {} — empty line or 'exit' to quit",
        pipeline.generation_model()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() || question == "exit" {
            break;
        }

        let answer = pipeline.answer(CLI_COLLECTION, question, top_k).await?;
        print_answer(&answer, false);
    }

    pipeline.shutdown().await;
    Ok(())
}

fn print_answer(answer: &Answer, show_sources: bool) {
    match &answer.error {
        Some(cause) => println!("generation failed: {}", cause),
        None => println!("{}", answer.text),
    }

    if show_sources {
        println!();
        if answer.sources.is_empty() {
            println!("sources: none (empty index or no matches)");
        }
        for source in &answer.sources {
            let excerpt: String = source.chunk.text.chars().take(160).collect();
            println!(
                "{}. [{:.3}] {} (chapter {}, chunk {})",
                source.rank,
                source.score,
                source.chunk.document_id,
                source.chunk.chapter_index,
                source.chunk.chunk_index
            );
            println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        }
    }
}
