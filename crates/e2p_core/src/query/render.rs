//! Plain-text rendering of query results.

use crate::model::item::Item;
use crate::model::source::Source;
use serde_json::Value;
use std::fmt::Write;

pub const NO_RESULTS: &str = "No results found for the given query.";

/// Renders `items` under a header echoing `raw_query`.
///
/// Items are expected in engine order (grouped by canonical source order);
/// one section is emitted per source that has results.
pub fn render_results(raw_query: &str, items: &[&Item]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "QUERY: \"{}\"", raw_query.trim());

    if items.is_empty() {
        out.push('\n');
        out.push_str(NO_RESULTS);
        out.push('\n');
        return out;
    }

    for source in Source::ALL {
        let mut section = items.iter().filter(|item| item.source == source).peekable();
        if section.peek().is_none() {
            continue;
        }
        let _ = writeln!(
            out,
            "\n*** {} ***",
            source.display_name().to_uppercase()
        );
        for item in section {
            render_item(&mut out, item);
        }
    }
    out
}

fn render_item(out: &mut String, item: &Item) {
    out.push_str("---\n");
    let _ = writeln!(out, "Title: {}", item.title);
    let _ = writeln!(out, "Date: {}", item.timestamp.format("%Y-%m-%d %H:%M"));
    if !item.tags.is_empty() {
        let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Tags: {}", tags.join(", "));
    }
    for (key, value) in &item.metadata {
        let _ = writeln!(out, "{}: {}", metadata_label(key), metadata_value(value));
    }
    if let Some(body) = item.body.as_deref() {
        let _ = writeln!(out, "{}", body.trim_end());
    }
}

fn metadata_label(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn metadata_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => match number.as_f64() {
            Some(float) if number.is_f64() => format!("{float:.2}"),
            _ => number.to_string(),
        },
        other => other.to_string(),
    }
}
