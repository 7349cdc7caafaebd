//! Prompt assembly.
//!
//! One fixed template, slots filled in order: a framing sentence naming the
//! assistant's domain, the context-only rule with its literal fallback
//! answer, an optional conversation block, the retrieved context in rank
//! order, and the question.
//!
//! Two contracts matter here:
//!
//! - When the context cannot support an answer, the model is told to reply
//!   with exactly [`FALLBACK_ANSWER`] rather than fabricate. The
//!   instruction survives even when retrieval came back empty.
//! - The assembled prompt never exceeds the generation capability's window:
//!   when the retrieved chunks would overflow the character budget, whole
//!   chunks are dropped lowest-rank-first.

use crate::config::GenerationConfig;
use crate::models::{ConversationTurn, ScoredChunk};

/// The literal string the model must return when the context is
/// insufficient.
pub const FALLBACK_ANSWER: &str = "I don't know";

/// Separator between chunks in the context section.
const CONTEXT_DELIMITER: &str = "\n---\n";

/// Assemble the generation prompt.
///
/// `chunks` must already be in retrieval rank order. `history` is only
/// included when `config.include_history` is set; it is off by default
/// because prior turns were observed to pull answers off the supplied
/// context.
pub fn assemble(
    question: &str,
    chunks: &[ScoredChunk],
    history: &[ConversationTurn],
    config: &GenerationConfig,
) -> String {
    let header = format!(
        "You are an assistant that answers questions about {} using excerpts \
         from its documentation.\nAnswer using only the context below. If the \
         context does not contain the answer, reply exactly: {}.\n",
        config.domain, FALLBACK_ANSWER
    );

    let history_block = if config.include_history && !history.is_empty() {
        let turns = history
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.content))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\nConversation so far:\n{}\n", turns)
    } else {
        String::new()
    };

    let footer = format!("\nQuestion:\n{}\n\nAnswer:", question);

    // Everything except the context is non-negotiable; the context gets
    // whatever budget is left.
    let fixed_chars = char_len(&header)
        + char_len(&history_block)
        + char_len("\nContext:\n")
        + char_len(&footer);
    let context_budget = config.context_window_chars.saturating_sub(fixed_chars);
    let context = build_context(chunks, context_budget);

    format!("{header}{history_block}\nContext:\n{context}{footer}")
}

/// Join chunk texts in rank order, dropping lowest-ranked chunks that do
/// not fit the budget.
fn build_context(chunks: &[ScoredChunk], budget_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for chunk in chunks {
        let sep = if out.is_empty() { 0 } else { char_len(CONTEXT_DELIMITER) };
        let cost = sep + char_len(&chunk.chunk.text);
        if used + cost > budget_chars {
            // Rank order means everything after this is lower-ranked too.
            break;
        }
        if sep > 0 {
            out.push_str(CONTEXT_DELIMITER);
        }
        out.push_str(&chunk.chunk.text);
        used += cost;
    }

    out
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Role};

    fn scored(id: &str, text: &str, score: f32, rank: usize) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: id.into(),
                document_id: "m1".into(),
                chapter_index: 0,
                chunk_index: 0,
                text: text.into(),
                hash: String::new(),
            },
            score,
            rank,
        }
    }

    fn config() -> GenerationConfig {
        GenerationConfig {
            domain: "the widget manuals".into(),
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn template_slots_appear_in_order() {
        let chunks = vec![scored("c1", "Widgets have three modes.", 0.9, 1)];
        let prompt = assemble("How many modes?", &chunks, &[], &config());

        let framing = prompt.find("the widget manuals").unwrap();
        let fallback = prompt.find(FALLBACK_ANSWER).unwrap();
        let context = prompt.find("Widgets have three modes.").unwrap();
        let question = prompt.find("How many modes?").unwrap();
        assert!(framing < fallback);
        assert!(fallback < context);
        assert!(context < question);
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn chunks_join_in_rank_order_with_delimiter() {
        let chunks = vec![
            scored("c1", "First ranked.", 0.9, 1),
            scored("c2", "Second ranked.", 0.5, 2),
        ];
        let prompt = assemble("q", &chunks, &[], &config());
        let first = prompt.find("First ranked.").unwrap();
        let second = prompt.find("Second ranked.").unwrap();
        assert!(first < second);
        assert!(prompt.contains("\n---\n"));
    }

    #[test]
    fn empty_retrieval_still_carries_the_fallback_clause() {
        let prompt = assemble("q", &[], &[], &config());
        assert!(prompt.contains(FALLBACK_ANSWER));
        assert!(prompt.contains("Context:\n\n"));
    }

    #[test]
    fn history_is_excluded_by_default() {
        let history = vec![
            ConversationTurn::now(Role::User, "earlier question"),
            ConversationTurn::now(Role::Assistant, "earlier answer"),
        ];
        let prompt = assemble("q", &[], &history, &config());
        assert!(!prompt.contains("earlier question"));

        let mut with_history = config();
        with_history.include_history = true;
        let prompt = assemble("q", &[], &history, &with_history);
        assert!(prompt.contains("user: earlier question"));
        assert!(prompt.contains("assistant: earlier answer"));
    }

    #[test]
    fn overflow_drops_lowest_ranked_chunks_first() {
        let mut cfg = config();
        cfg.context_window_chars = 400;
        let chunks = vec![
            scored("c1", &"a".repeat(150), 0.9, 1),
            scored("c2", &"b".repeat(150), 0.8, 2),
            scored("c3", &"c".repeat(150), 0.7, 3),
        ];
        let prompt = assemble("q", &chunks, &[], &cfg);
        assert!(prompt.contains(&"a".repeat(150)));
        assert!(!prompt.contains(&"c".repeat(150)));
        assert!(prompt.chars().count() <= 400 + 150); // fixed parts are small
    }

    #[test]
    fn prompt_stays_within_the_window_when_chunks_fit() {
        let mut cfg = config();
        cfg.context_window_chars = 2000;
        let chunks = vec![scored("c1", &"x".repeat(500), 0.9, 1)];
        let prompt = assemble("q", &chunks, &[], &cfg);
        assert!(prompt.chars().count() <= 2000);
    }
}
