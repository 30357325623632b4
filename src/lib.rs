//! # Clone Monitor
//!
//! **Observes a running clone-detection pipeline and records its progress.**
//!
//! The pipeline writes its intermediate results (files, chunks, candidate
//! pairs, clones) and a stream of human-readable status updates into a
//! shared store. The monitor never touches the pipeline itself; it polls the
//! store on a fixed interval and turns what it sees into two files:
//!
//! - a **time series** of document counts per collection, one row per tick,
//!   with the seconds elapsed since sampling started;
//! - a **status log** of every status update, oldest first, each written
//!   exactly once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │  Store   │──▶│ SamplingLoop │──▶│  data.csv  │──┐
//! │ (SQLite) │   │  (sampler)   │──▶│ status.csv │  │
//! └────┬─────┘   └──────────────┘   └────────────┘  │
//!      │                                            ▼
//!      │                                   ┌─────────────────┐
//!      └──────────────────────────────────▶│ StatisticsEngine│
//!                                          └───────┬─────────┘
//!                                          ┌───────┴───────┐
//!                                          ▼               ▼
//!                                     ┌─────────┐     ┌─────────┐
//!                                     │   CLI   │     │  HTTP   │
//!                                     └─────────┘     └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! monitor init           # create an empty store with the expected layout
//! monitor sample         # poll until Ctrl-C
//! monitor stats          # derived statistics over the series so far
//! monitor serve          # JSON API on 0.0.0.0:7003
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, environment overrides, validation |
//! | [`db`] | Connecting to the store with retry |
//! | [`sqlite_store`] | SQLite implementation of the store interface |
//! | [`migrate`] | Creating the store layout (`monitor init`) |
//! | [`series_writer`] | Appending count rows to the series file |
//! | [`status_tracker`] | Incremental status log |
//! | [`sampler`] | The sampling loop |
//! | [`stats`] | Reading the series back and summarizing it |
//! | [`inspect`] | Collection counts and recent status updates |
//! | [`server`] | Read-only JSON API |
//!
//! The data model, the store trait, series parsing and the statistics
//! engine live in the `monitor-core` crate.

pub mod config;
pub mod db;
pub mod error;
pub mod inspect;
pub mod logging;
pub mod migrate;
pub mod sampler;
pub mod series_writer;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod status_tracker;
