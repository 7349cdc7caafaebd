//! Chapter segmentation.
//!
//! Splits a manual's extracted page text into chapter-level units under one
//! of two policies:
//!
//! - **Page boundaries** — an ordered list of chapter-end page indices
//!   (0-based, exclusive) supplied per document. Pages from the previous
//!   boundary up to each end concatenate into one chapter; leftover pages
//!   after the last boundary form a final chapter. Out-of-range page indices
//!   are skipped with a warning, never fatal.
//! - **Headings** — case-insensitive `Chapter N` / `Section N` markers at
//!   line starts split the concatenated document text; any preamble before
//!   the first marker becomes its own chapter.
//!
//! Both policies are deterministic for identical input, and neither drops
//! text: concatenating the returned chapters in order reproduces the
//! document. Whitespace-only chapters are filtered later, by the chunking
//! stage.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::config::{DocumentConfig, SegmenterConfig};
use crate::extract::{extract_document, ExtractError};
use crate::models::{Chapter, DocumentText};

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:chapter|section)[ \t]+\d+").expect("heading pattern compiles")
});

/// How a document is cut into chapters.
#[derive(Debug, Clone)]
pub enum ChapterPolicy {
    /// Ordered chapter-end page indices (0-based, exclusive).
    PageBounds(Vec<usize>),
    /// Split on `Chapter N` / `Section N` heading markers.
    Headings,
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("document '{0}' produced no chapters")]
    EmptyDocument(String),
}

/// Split a document into chapters under the given policy.
pub fn segment(doc: &DocumentText, policy: &ChapterPolicy) -> Vec<Chapter> {
    match policy {
        ChapterPolicy::PageBounds(ends) => segment_by_pages(doc, ends),
        ChapterPolicy::Headings => segment_by_headings(doc),
    }
}

/// Pick the chapter policy for one document.
///
/// `auto` uses the document's configured page boundaries where present and
/// heading detection otherwise; `headings` forces heading detection.
pub fn policy_for(segmenter: &SegmenterConfig, doc: &DocumentConfig) -> ChapterPolicy {
    if segmenter.policy == "headings" {
        return ChapterPolicy::Headings;
    }
    match &doc.chapter_ends {
        Some(ends) => ChapterPolicy::PageBounds(ends.clone()),
        None => ChapterPolicy::Headings,
    }
}

/// Extract a configured manual and segment it, for the build pipeline.
///
/// A document whose chapters are all empty is an error here so the caller
/// can log it and move on to the remaining documents.
pub fn load_chapters(
    doc: &DocumentConfig,
    policy: &ChapterPolicy,
) -> Result<(DocumentText, Vec<Chapter>), SegmentError> {
    let text = extract_document(&doc.id, doc.title(), &doc.path)?;
    let chapters = segment(&text, policy);
    if chapters.iter().all(|c| c.text.trim().is_empty()) {
        return Err(SegmentError::EmptyDocument(doc.id.clone()));
    }
    Ok((text, chapters))
}

fn segment_by_pages(doc: &DocumentText, chapter_ends: &[usize]) -> Vec<Chapter> {
    let page_count = doc.pages.len();
    let mut chapters = Vec::new();
    let mut start_page = 0usize;

    for &end_page in chapter_ends {
        let mut text = String::new();
        for page in start_page..end_page {
            if page < page_count {
                text.push_str(&doc.pages[page]);
            } else {
                warn!(document = %doc.id, page, "chapter boundary page out of range, skipping");
            }
        }
        chapters.push(Chapter {
            document_id: doc.id.clone(),
            index: chapters.len(),
            start: start_page.min(page_count),
            end: end_page.min(page_count),
            text,
        });
        start_page = end_page;
    }

    // Any pages after the last boundary become a final chapter.
    if start_page < page_count {
        let text: String = doc.pages[start_page..].concat();
        chapters.push(Chapter {
            document_id: doc.id.clone(),
            index: chapters.len(),
            start: start_page,
            end: page_count,
            text,
        });
    }

    chapters
}

fn segment_by_headings(doc: &DocumentText) -> Vec<Chapter> {
    let full: String = doc.pages.concat();
    if full.is_empty() {
        return Vec::new();
    }

    let mut starts: Vec<usize> = HEADING_RE.find_iter(&full).map(|m| m.start()).collect();
    // Text before the first marker is a preamble chapter.
    if starts.first() != Some(&0) {
        starts.insert(0, 0);
    }

    let mut chapters = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(full.len());
        chapters.push(Chapter {
            document_id: doc.id.clone(),
            index: i,
            start,
            end,
            text: full[start..end].to_string(),
        });
    }
    chapters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pages: &[&str]) -> DocumentText {
        DocumentText {
            id: "m1".into(),
            title: "Manual One".into(),
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn page_bounds_concatenate_ranges() {
        let d = doc(&["p0 ", "p1 ", "p2 ", "p3 ", "p4 "]);
        let chapters = segment(&d, &ChapterPolicy::PageBounds(vec![2, 4]));
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].text, "p0 p1 ");
        assert_eq!(chapters[1].text, "p2 p3 ");
        assert_eq!(chapters[2].text, "p4 ");
        assert_eq!((chapters[1].start, chapters[1].end), (2, 4));
    }

    #[test]
    fn page_bounds_reconstruct_full_text() {
        let d = doc(&["alpha ", "beta ", "gamma ", "delta "]);
        let chapters = segment(&d, &ChapterPolicy::PageBounds(vec![1, 3]));
        let rebuilt: String = chapters.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, d.pages.concat());
    }

    #[test]
    fn out_of_range_boundary_pages_are_skipped() {
        let d = doc(&["p0 ", "p1 "]);
        let chapters = segment(&d, &ChapterPolicy::PageBounds(vec![1, 5]));
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].text, "p1 ");
        // No leftover chapter: the out-of-range boundary consumed the rest.
        assert_eq!(chapters[1].end, 2);
    }

    #[test]
    fn no_bounds_yields_single_leftover_chapter() {
        let d = doc(&["p0 ", "p1 "]);
        let chapters = segment(&d, &ChapterPolicy::PageBounds(vec![]));
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].text, "p0 p1 ");
    }

    #[test]
    fn headings_split_on_chapter_and_section_markers() {
        let d = doc(&[
            "Preface material.\nChapter 1 Introduction\nbody one\n",
            "section 2 Details\nbody two\n",
        ]);
        let chapters = segment(&d, &ChapterPolicy::Headings);
        assert_eq!(chapters.len(), 3);
        assert!(chapters[0].text.starts_with("Preface"));
        assert!(chapters[1].text.starts_with("Chapter 1"));
        assert!(chapters[2].text.starts_with("section 2"));
    }

    #[test]
    fn headings_reconstruct_full_text() {
        let d = doc(&["Intro\nChapter 1 A\naaa\nChapter 2 B\nbbb"]);
        let chapters = segment(&d, &ChapterPolicy::Headings);
        let rebuilt: String = chapters.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(rebuilt, d.pages.concat());
    }

    #[test]
    fn headings_without_preamble_start_at_first_marker() {
        let d = doc(&["Chapter 1 A\naaa\nChapter 2 B\nbbb"]);
        let chapters = segment(&d, &ChapterPolicy::Headings);
        assert_eq!(chapters.len(), 2);
        assert!(chapters[0].text.starts_with("Chapter 1"));
    }

    #[test]
    fn segmentation_is_deterministic() {
        let d = doc(&["Chapter 1 A\naaa\n", "Chapter 2 B\nbbb\n"]);
        let a = segment(&d, &ChapterPolicy::Headings);
        let b = segment(&d, &ChapterPolicy::Headings);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!((x.start, x.end), (y.start, y.end));
        }
    }

    #[test]
    fn empty_document_yields_no_heading_chapters() {
        let d = doc(&[]);
        assert!(segment(&d, &ChapterPolicy::Headings).is_empty());
    }
}
