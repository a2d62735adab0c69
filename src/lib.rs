//! # PDF Assistant
//!
//! A small service that lets logged-in users upload a PDF and ask questions
//! about it. Pages are gated by role; each page runs a single-agent crew
//! over retrieved passages from the uploaded document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Login   │──▶│ Page access│──▶│ Upload (tmp) │──▶│ Chunk+Embed │
//! │ (cookie) │   │  (roles)   │   │  PDF → text  │   │ VectorIndex │
//! └──────────┘   └────────────┘   └──────────────┘   └──────┬──────┘
//!                                                           │
//!                    ┌──────────┐   ┌───────────────┐       ▼
//!                    │  Answer  │◀──│ Crew (agent + │◀── Retriever (MMR)
//!                    │ +sources │   │  task) → LLM  │    + context block
//!                    └──────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pdfa hash-password 's3cret'          # hash for config/creds.yaml
//! pdfa check                           # validate config, list pages and keys
//! pdfa serve                           # start the HTTP API
//! pdfa ask --file report.pdf "What is the conclusion?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`keys`] | Provider API keys from the environment |
//! | [`credentials`] | YAML credentials file, bcrypt verification |
//! | [`session`] | Signed session cookie, in-memory session state |
//! | [`access`] | Role-based page filtering |
//! | [`upload`] | Temporary upload file guard |
//! | [`extract`] | Per-page PDF text extraction |
//! | [`chunk`] | Recursive character splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | In-memory vector index and retriever |
//! | [`prompt`] | Context block and task prompt |
//! | [`llm`] | Chat model providers |
//! | [`agent`] | Agent, task and crew runner |
//! | [`pipeline`] | Ingest and ask |
//! | [`server`] | HTTP API |

pub mod access;
pub mod agent;
pub mod ask_cmd;
pub mod check;
pub mod chunk;
pub mod config;
pub mod credentials;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod keys;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod server;
pub mod session;
mod transport;
pub mod upload;
