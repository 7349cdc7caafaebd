//! # manual-qa
//!
//! A retrieval-augmented question answering engine for product manuals.
//!
//! manual-qa ingests manuals (PDF, DOCX, plain text), segments them into
//! chapters and bounded chunks, embeds the chunks into a SQLite snapshot,
//! and answers natural-language questions by retrieving the most similar
//! chunks and conditioning a language model on them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────┐
//! │ Manuals  │──▶│   Segmenter   │──▶│  SQLite   │
//! │ PDF/DOCX │   │ chapters/chunks│  │ snapshot  │
//! └──────────┘   │  + embeddings │   └─────┬─────┘
//!                └───────────────┘         │  (build once, load after)
//!                                          ▼
//!            question ──▶ Retriever ──▶ Prompt ──▶ Generator ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mqa init                          # create the snapshot database
//! mqa ingest                       # segment + chunk + embed the manuals
//! mqa ask "What are the routing options?" --show-sources
//! mqa chat                         # interactive loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-page text extraction (PDF, DOCX, plain text) |
//! | [`segment`] | Chapter segmentation policies |
//! | [`chunk`] | Bounded chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Index build / load / persist lifecycle |
//! | [`retrieve`] | Cosine top-K retrieval |
//! | [`prompt`] | Prompt assembly with the fallback contract |
//! | [`generate`] | Generation provider abstraction |
//! | [`history`] | Conversation history boundary |
//! | [`pipeline`] | The retrieve → assemble → generate pipeline |

pub mod ask;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod history;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retrieve;
pub mod segment;
pub mod status;
