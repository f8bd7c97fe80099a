//! Use-case API for tool hosts.
//!
//! # Responsibility
//! - Serve `query` and `help` requests from an immutable cache snapshot.
//! - Keep response semantics simple: one envelope, text plus diagnostics.
//!
//! # Invariants
//! - Never fetches from a source and never writes the cache file.
//! - Request handling never panics; every failure becomes `ok = false`.
//! - A failed reload keeps serving the previously loaded snapshot.

use chrono::{Local, NaiveDateTime};
use e2p_core::{
    render_help, render_results, run_query, CacheResult, CacheSnapshot, CacheStore,
    TagDescriptions,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// One tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ToolRequest {
    Query {
        #[serde(default)]
        query: String,
    },
    Help,
}

/// Response envelope for every tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    /// Rendered results or help text; empty on failure.
    pub text: String,
    pub item_count: usize,
    /// Non-fatal query findings, human readable.
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    fn success(text: String, item_count: usize, warnings: Vec<String>) -> Self {
        Self {
            ok: true,
            text,
            item_count,
            warnings,
            error: None,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: String::new(),
            item_count: 0,
            warnings: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Query tool bound to one cache file.
#[derive(Debug)]
pub struct QueryTool {
    store: CacheStore,
    snapshot: Arc<CacheSnapshot>,
    loaded_mtime: Option<SystemTime>,
    descriptions: TagDescriptions,
}

impl QueryTool {
    /// Loads the cache at `cache_path`.
    ///
    /// # Errors
    /// - `CacheError::Unavailable` when the file is missing or unusable.
    /// - `CacheError::NewerFormat` when a newer build wrote the file.
    pub fn open(cache_path: impl Into<PathBuf>) -> CacheResult<Self> {
        let store = CacheStore::new(cache_path);
        let loaded_mtime = store.modified();
        let snapshot = store.load()?;
        Ok(Self {
            store,
            snapshot: Arc::new(snapshot),
            loaded_mtime,
            descriptions: TagDescriptions::new(),
        })
    }

    /// Serves from an already built snapshot; used by in-process hosts.
    pub fn from_snapshot(store: CacheStore, snapshot: Arc<CacheSnapshot>) -> Self {
        let loaded_mtime = store.modified();
        Self {
            store,
            snapshot,
            loaded_mtime,
            descriptions: TagDescriptions::new(),
        }
    }

    pub fn with_tag_descriptions(mut self, descriptions: TagDescriptions) -> Self {
        self.descriptions = descriptions;
        self
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Re-reads the cache file when its modification time moved.
    ///
    /// Returns `Ok(true)` when a newer snapshot was loaded. On error the
    /// current snapshot stays in place.
    pub fn reload_if_changed(&mut self) -> CacheResult<bool> {
        let modified = self.store.modified();
        if modified.is_none() || modified == self.loaded_mtime {
            return Ok(false);
        }
        let snapshot = self.store.load()?;
        info!(
            "event=cache_reload module=api status=ok items={}",
            snapshot.total_items()
        );
        self.snapshot = Arc::new(snapshot);
        self.loaded_mtime = modified;
        Ok(true)
    }

    /// Markdown guide describing the grammar and the cached sources and tags.
    pub fn tool_description(&self) -> String {
        render_help(&self.snapshot, &self.descriptions)
    }

    pub fn handle(&self, request: &ToolRequest) -> ToolResponse {
        match request {
            ToolRequest::Query { query } => self.query(query),
            ToolRequest::Help => ToolResponse::success(self.tool_description(), 0, Vec::new()),
        }
    }

    /// Runs `raw` against the loaded snapshot using the local clock.
    pub fn query(&self, raw: &str) -> ToolResponse {
        self.query_at(raw, Local::now().naive_local())
    }

    /// Runs `raw` with an explicit `now` for relative dates.
    pub fn query_at(&self, raw: &str, now: NaiveDateTime) -> ToolResponse {
        match run_query(&self.snapshot, raw, now) {
            Ok(run) => {
                let warnings = run.warnings.iter().map(ToString::to_string).collect();
                let text = render_results(raw, &run.items);
                ToolResponse::success(text, run.items.len(), warnings)
            }
            Err(err) => ToolResponse::failure(err.to_string()),
        }
    }

    /// Handles one JSON request line and returns one JSON response line.
    ///
    /// Picks up a newer cache file first; a failed reload is logged and the
    /// request is answered from the previous snapshot.
    pub fn handle_json_line(&mut self, line: &str) -> String {
        if let Err(err) = self.reload_if_changed() {
            warn!(
                "event=cache_reload module=api status=error error={}",
                err
            );
        }
        let response = match serde_json::from_str::<ToolRequest>(line) {
            Ok(request) => self.handle(&request),
            Err(err) => ToolResponse::failure(format!("invalid request: {err}")),
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(r#"{{"ok":false,"text":"","item_count":0,"warnings":[],"error":"{err}"}}"#)
        })
    }
}
