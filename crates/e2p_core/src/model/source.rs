//! Source identity for cached items.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One upstream personal-data system.
///
/// Declaration order is the canonical order used for query output and
/// help generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Markdown notes vault.
    Notes,
    /// Task manager items.
    Tasks,
    /// Read-later articles.
    Articles,
    /// Calendar events.
    Calendar,
    /// Daily health records.
    Health,
}

impl Source {
    /// Every source in canonical order.
    pub const ALL: [Source; 5] = [
        Source::Notes,
        Source::Tasks,
        Source::Articles,
        Source::Calendar,
        Source::Health,
    ];

    /// Stable wire id used in cache files, query strings and config keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Tasks => "tasks",
            Self::Articles => "articles",
            Self::Calendar => "calendar",
            Self::Health => "health",
        }
    }

    /// Name of the upstream system feeding this source.
    pub fn upstream_name(self) -> &'static str {
        match self {
            Self::Notes => "obsidian",
            Self::Tasks => "todoist",
            Self::Articles => "instapaper",
            Self::Calendar => "calendar",
            Self::Health => "health",
        }
    }

    /// Section heading used by rendered output.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Notes => "Notes",
            Self::Tasks => "Tasks",
            Self::Articles => "Articles",
            Self::Calendar => "Calendar Events",
            Self::Health => "Health Data",
        }
    }

    /// Parses a source name case-insensitively.
    ///
    /// Accepts the wire id as well as the upstream system name.
    pub fn parse(value: &str) -> Option<Source> {
        match value.trim().to_ascii_lowercase().as_str() {
            "notes" | "obsidian" => Some(Self::Notes),
            "tasks" | "todoist" => Some(Self::Tasks),
            "articles" | "instapaper" => Some(Self::Articles),
            "calendar" | "gcal" | "ical" => Some(Self::Calendar),
            "health" => Some(Self::Health),
            _ => None,
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
