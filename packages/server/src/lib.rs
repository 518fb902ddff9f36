//! EquiTable backend core - live food pantry discovery and ingestion.
//!
//! The interesting machinery lives in `domains::discovery`: a background
//! job orchestrator that searches an area for food pantries, deduplicates
//! against stored records, fans candidate websites through the
//! scrape -> extract -> validate pipeline, and streams progress events to
//! the client over SSE.
//!
//! # Modules
//!
//! - [`kernel`] - infrastructure clients and ports (places search, scraper,
//!   LLM extractor) behind `Base*` traits for dependency injection
//! - [`domains`] - pantry records and the discovery orchestration core
//! - [`server`] - axum application, routes, and the binary entry point
//! - [`common`] - shared helpers (geo math, address parsing)

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;
