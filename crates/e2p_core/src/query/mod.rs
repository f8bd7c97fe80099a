//! Query path: grammar, evaluation, statistics and output.
//!
//! # Responsibility
//! - Parse compact filter strings into typed queries.
//! - Evaluate queries against an immutable cache snapshot.
//! - Derive help text and rendered results from snapshot contents.
//!
//! # Invariants
//! - Nothing in this module performs I/O or triggers a fetch.

pub mod engine;
pub mod filter;
pub mod help;
pub mod parser;
pub mod render;
pub mod stats;
