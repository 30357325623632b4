//! # Clone Monitor Core
//!
//! Shared, I/O-free logic for Clone Monitor: data models, the store
//! abstraction, series parsing, and the statistics engine.
//!
//! This crate contains no tokio runtime, sqlx, or filesystem access. The
//! sampler and the HTTP surface in the `clone-monitor` crate supply the
//! store implementation and the file contents.

pub mod models;
pub mod series;
pub mod stats;
pub mod store;
