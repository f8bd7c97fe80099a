//! Unified item model shared by every personal data source.
//!
//! # Responsibility
//! - Define the single shape every source record is normalized into.
//! - Own source identity and canonical source ordering.
//!
//! # Invariants
//! - `id + source` is unique across the cache.
//! - Every item carries a timestamp; sources without a natural date
//!   substitute the fetch or creation time.

pub mod item;
pub mod source;
