//! # ragops
//!
//! A retrieval service over a flat directory of documents, plus the tooling
//! to evaluate it: synthetic QA generation, an LLM judge and CSV reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────┐
//! │ data_dir  │──▶│ Read+Chunk   │──▶│  SQLite  │
//! │ (uploads) │   │ (+Embed)     │   │ gen/nodes│
//! └───────────┘   └──────┬───────┘   └──────────┘
//!                        ▼
//!                 ┌──────────────┐     ┌──────────┐
//!                 │ IndexStore   │◀────│   HTTP   │
//!                 │ (live Arc)   │     │  /api/*  │
//!                 └──────────────┘     └────▲─────┘
//!                                           │
//!                 ┌──────────────┐     ┌────┴─────┐
//!                 │ Judge+Report │◀────│  Client  │
//!                 └──────────────┘     └──────────┘
//! ```
//!
//! Every upload or reload rebuilds the whole index off the request path;
//! queries keep using the previous snapshot until the new one is swapped in.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction (plain text, PDF, DOCX, PPTX) |
//! | [`reader`] | Data directory reader |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`db`] / [`migrate`] | Index database |
//! | [`index`] | Index build and retrieval |
//! | [`store`] | Live index handle |
//! | [`llm`] | Chat completion client |
//! | [`query`] | Query engine and context shaping |
//! | [`ingest`] | Uploads and document listing |
//! | [`server`] | HTTP API |
//! | [`client`] | Retrieval service client |
//! | [`generate`] | QA pair generation |
//! | [`judge`] | LLM-as-judge metrics |
//! | [`cases`] | Test case loading |
//! | [`report`] | CSV reports |
//! | [`eval`] | Evaluation run |

pub mod cases;
pub mod chunk;
pub mod client;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod judge;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod query;
pub mod reader;
pub mod report;
pub mod server;
pub mod store;

#[cfg(test)]
mod test_support;
