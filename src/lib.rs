//! # Paperdrop
//!
//! Batch ingestion of PDF attachments from a chat channel into a metadata
//! store.
//!
//! Paperdrop scans a channel for messages carrying PDF attachments,
//! downloads the PDFs, extracts their text, infers a title and publication
//! date per document via a remote LLM, and upserts the resulting metadata
//! into SQLite — skipping work already done on a previous run.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────┐   ┌──────────┐   ┌─────────┐   ┌────────┐   ┌─────────┐
//! │ fetch │──▶│ download │──▶│ extract │──▶│ enrich │──▶│ persist │
//! │ pages │   │ id_name  │   │ pool    │   │ serial │   │ upsert  │
//! └───────┘   └──────────┘   └─────────┘   └────────┘   └─────────┘
//!    API       disk cache     parallel      retry/        SQLite
//!                             ordered       backoff
//! ```
//!
//! Each stage fully materializes its output before the next begins. A run
//! interrupted at any point is safe to repeat: downloads are skipped when
//! the file is already on disk, and persistence is an upsert keyed by the
//! attachment id.
//!
//! ## Quick Start
//!
//! ```bash
//! paperdrop init                 # create database
//! paperdrop run                  # ingest the configured channel
//! paperdrop stats                # what landed in the store
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Per-stage value types |
//! | [`source`] | Message source API traits + Slack client |
//! | [`fetch`] | Stage 1: channel scan and PDF filtering |
//! | [`download`] | Stage 2: idempotent attachment download |
//! | [`extract`] | Stage 3: parallel order-preserving extraction |
//! | [`metadata`] | Inference provider (OpenAI) |
//! | [`enrich`] | Stage 4: sequential enrichment with retry policy |
//! | [`persist`] | Stage 5: upsert by file id |
//! | [`pipeline`] | Stage orchestration |
//! | [`db`] | Database connection and readiness probing |
//! | [`migrate`] | Schema migrations |
//! | [`progress`] | Stage progress reporting on stderr |
//! | [`stats`] | Store statistics command |

pub mod config;
pub mod db;
pub mod download;
pub mod enrich;
pub mod extract;
pub mod fetch;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod stats;
