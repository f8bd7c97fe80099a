//! Update path: source fetchers, staleness policy and refresh runs.
//!
//! # Responsibility
//! - Define the fetcher capability every source adapter implements.
//! - Decide when a source's cached slice is stale.
//! - Replace slices atomically and persist the resulting snapshot.
//!
//! # Invariants
//! - The query path never calls into this module.
//! - Fetch failures are source-scoped and never fatal to the process.

pub mod fetcher;
pub mod policy;
pub mod scheduler;
