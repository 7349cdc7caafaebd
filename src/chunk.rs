//! Bounded chunking with overlap.
//!
//! Splits chapter text into [`Chunk`]s of at most `max_chars` characters.
//! Splitting prefers paragraph boundaries (`\n\n`), falls back to line
//! boundaries, and hard-splits single oversized lines as a last resort.
//! Every chunk after the first begins with exactly the last `overlap`
//! characters of its predecessor, so context survives the cut.
//!
//! A chapter that already fits in `max_chars` is emitted unchanged as a
//! single chunk. Counting is character-based and UTF-8 safe.
//!
//! Each chunk receives a UUID plus a SHA-256 hash of its text for
//! staleness detection.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chapter, Chunk};

/// Split text into pieces of at most `max_chars` characters with an
/// `overlap`-character carry between consecutive pieces.
///
/// `overlap < max_chars` is validated at config load; this function assumes
/// it.
pub fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < max_chars);

    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    // Atomic segments: paragraphs, oversized paragraphs broken into lines.
    // split_inclusive keeps separators attached, so segments concatenate
    // back to the input exactly.
    let mut segments: Vec<&str> = Vec::new();
    for para in text.split_inclusive("\n\n") {
        if char_len(para) <= max_chars {
            segments.push(para);
        } else {
            segments.extend(para.split_inclusive('\n'));
        }
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;
    // Leading chars of `current` that repeat the previous chunk's tail.
    let mut carried = 0usize;

    for seg in &segments {
        let mut rest: &str = seg;
        loop {
            let rest_chars = char_len(rest);
            if rest_chars == 0 {
                break;
            }
            if current_chars + rest_chars <= max_chars {
                current.push_str(rest);
                current_chars += rest_chars;
                break;
            }
            if current_chars > carried && overlap + rest_chars <= max_chars {
                // The segment fits cleanly into the next window: close this
                // chunk at the segment boundary.
                flush(&mut chunks, &mut current, &mut current_chars, overlap);
                carried = overlap;
            } else {
                // Oversized segment: fill the window to the brim and cut.
                let take = max_chars - current_chars;
                let cut = char_boundary(rest, take);
                current.push_str(&rest[..cut]);
                current_chars = max_chars;
                rest = &rest[cut..];
                flush(&mut chunks, &mut current, &mut current_chars, overlap);
                carried = overlap;
            }
        }
    }

    // A trailing window that holds only the carried overlap is already
    // contained in the previous chunk.
    if current_chars > carried || chunks.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_chars: &mut usize, overlap: usize) {
    let tail = tail_chars(current, overlap);
    chunks.push(std::mem::replace(current, tail));
    *current_chars = overlap;
}

/// Chunk a sequence of chapters, dropping whitespace-only chapters.
/// Chunk indices are contiguous per chapter, starting at 0.
pub fn chunk_chapters(chapters: &[Chapter], max_chars: usize, overlap: usize) -> Vec<Chunk> {
    let mut out = Vec::new();
    for chapter in chapters {
        if chapter.text.trim().is_empty() {
            continue;
        }
        for (i, piece) in split_text(&chapter.text, max_chars, overlap)
            .into_iter()
            .enumerate()
        {
            out.push(make_chunk(&chapter.document_id, chapter.index, i, piece));
        }
    }
    out
}

fn make_chunk(document_id: &str, chapter_index: usize, chunk_index: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chapter_index,
        chunk_index,
        text,
        hash,
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n_chars`-th character, clamped to the string end.
fn char_boundary(s: &str, n_chars: usize) -> usize {
    s.char_indices().nth(n_chars).map(|(i, _)| i).unwrap_or(s.len())
}

fn tail_chars(s: &str, n: usize) -> String {
    let total = char_len(s);
    s.chars().skip(total.saturating_sub(n)).collect()
}
