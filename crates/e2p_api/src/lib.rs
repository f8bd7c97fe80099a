//! Read-only query tool facade over the snapshot cache.
//! Front ends (CLI, JSON-lines server, agent tool hosts) call this crate only.

pub mod api;

pub use api::{QueryTool, ToolRequest, ToolResponse};
