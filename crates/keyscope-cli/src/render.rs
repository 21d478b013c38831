//! Plain-text rendering of core state for the terminal.

use keyscope_core::plugin::RenderedPlugin;
use keyscope_core::{CountReading, KeyDetails, Toast, ToastLevel};
use serde_json::Value;

pub fn toast_line(toast: &Toast) -> String {
    let marker = match toast.level {
        ToastLevel::Success => "ok",
        ToastLevel::Info => "info",
        ToastLevel::Warning => "warn",
        ToastLevel::Error => "error",
    };
    format!("[{marker}] {}", toast.message)
}

pub fn ttl_label(ttl: i64) -> String {
    if ttl < 0 {
        "no expiry".to_string()
    } else {
        format!("expires in {ttl}s")
    }
}

/// Header line plus the value. Strings print raw, everything else as
/// pretty JSON.
pub fn details(details: &KeyDetails) -> String {
    let value = match &details.value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    format!(
        "{} ({}, {})\n{value}",
        details.key,
        details.key_type,
        ttl_label(details.ttl)
    )
}

/// Numbered key list, starting at 1.
pub fn key_list(keys: &[String]) -> String {
    let width = keys.len().to_string().len();
    keys.iter()
        .enumerate()
        .map(|(i, key)| format!("{:>width$}  {key}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn count(reading: &CountReading) -> String {
    match reading {
        CountReading::Pending => "…".to_string(),
        CountReading::Count(n) => format!("{n} keys"),
        CountReading::Failed(_) => "count unavailable".to_string(),
    }
}

pub fn plugin(rendered: &RenderedPlugin) -> String {
    match &rendered.view {
        Ok(view) => {
            let mut out = format!("== {} ==", view.title);
            if view.lines.is_empty() {
                out.push_str("\n  (empty)");
            }
            for line in &view.lines {
                out.push_str("\n  ");
                out.push_str(line);
            }
            out
        }
        Err(message) => format!("== {} ==\n  failed to render: {message}", rendered.name),
    }
}
