//! # Groundwork
//!
//! A local retrieval-augmented generation tool: ingest text files into a
//! SQLite vector index, then answer questions grounded in the retrieved
//! passages.
//!
//! The pipeline itself (chunking, retrieval, reranking, generation,
//! decomposition, orchestration) lives in `groundwork-core`. This crate
//! supplies the storage backend, the embedding and LLM adapters, the
//! configuration file and the `gw` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Filesystem  │──▶│ Chunk+Embed │──▶│   SQLite     │
//! │   ingest    │   │             │   │ chunk_vectors│
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                        ┌───────────────────┘
//!                        ▼
//!        ┌───────────────────────────────┐     ┌──────────┐
//!        │ RagPipeline                   │────▶│   CLI    │
//!        │ retrieve → rerank → generate  │     │  (gw)    │
//!        └───────────────────────────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gw init                         # create database
//! gw ingest ./docs                # chunk, embed and index files
//! gw retrieve "tokio runtime"     # ranked passages only
//! gw ask "How does the runtime schedule tasks?"
//! gw ask --decompose "What is Tokio? What is Serde?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |
//! | [`sqlite_index`] | SQLite vector index |
//! | [`embedding`] | Embedding provider adapters |
//! | [`llm`] | Language model adapters |
//! | [`http`] | Shared retrying HTTP client |
//! | [`services`] | Config-to-pipeline wiring |
//! | [`ingest`] | Filesystem ingestion |
//! | [`ask`] | `retrieve` and `ask` commands |
//! | [`stats`] | Index statistics |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod services;
pub mod sqlite_index;
pub mod stats;
