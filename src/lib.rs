//! # askdocs
//!
//! Question answering over a private document corpus.
//!
//! askdocs ingests documents (plain text, Markdown, PDF, DOCX), chunks and
//! embeds them into SQLite, and answers natural-language questions by
//! retrieving the most similar chunks, assembling a size-bounded context,
//! and asking a generative backend to compose a grounded answer. Low
//! confidence answers are flagged for human follow-up via tickets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌──────────┐
//! │ Sources  │──▶│ Normalize+Chunk │──▶│  SQLite  │
//! │ txt/pdf/ │   │    + Embed      │   │ vectors  │
//! │ docx     │   └─────────────────┘   └────┬─────┘
//! └──────────┘                              │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │(askdocs) │       │ /query   │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! askdocs init                                  # create database
//! askdocs ingest handbook.pdf --name "Handbook" # chunk + embed + store
//! askdocs ask "how do I request a refund?"
//! askdocs serve                                 # POST /query HTTP endpoint
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`errors`] | Pipeline error taxonomy |
//! | [`normalize`] | Raw text canonicalization |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding backend abstraction |
//! | [`extract`] | Source file text extraction |
//! | [`store`] | Vector store and record persistence |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieve`] | Similarity retrieval and context assembly |
//! | [`answer`] | Answer composition with extractive fallback |
//! | [`ask`] | Query orchestration and escalation |
//! | [`server`] | HTTP query endpoint |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod ask;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod errors;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod normalize;
pub mod retrieve;
pub mod server;
pub mod store;
