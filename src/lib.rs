//! # Docsift
//!
//! A local-first document ingestion, classification, and retrieval pipeline.
//!
//! Docsift watches a drop directory, classifies each arriving document into a
//! category tree, files it away atomically, and indexes its text for semantic
//! question answering over the sorted corpus.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ Incoming │──▶│   Pipeline    │──▶│  Sorted   │
//! │  (watch) │   │ Hash/Classify │   │   tree    │
//! └──────────┘   │ Chunk/Embed  │   └───────────┘
//!                └──────┬───────┘
//!                       ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │  SQLite   │──────▶│   Ask    │
//!                 │ files+vec │       │  (CLI)   │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsift init                  # create database
//! docsift process               # ingest everything in the incoming dir
//! docsift watch                 # keep watching for new files
//! docsift ask "what was the Q3 budget?"
//! docsift reconcile             # repair drift after manual file moves
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format text extraction |
//! | [`classify`] | Multi-pass category classification |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector index adapter |
//! | [`metadata`] | File metadata store |
//! | [`ingest`] | Ingestion coordinator and repair paths |
//! | [`watch`] | Filesystem watcher |
//! | [`spell`] | Query spell correction |
//! | [`answer`] | Retrieval-grounded question answering |
//! | [`llm`] | Generative model client |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod spell;
pub mod stats;
pub mod store;
pub mod watch;
