//! Debug trace file for MCP tool calls.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Writes tool calls and results to a trace file when debug mode is on.
pub struct DebugLogger {
    enabled: bool,
    trace_file: Option<Mutex<File>>,
    trace_path: Option<PathBuf>,
}

impl DebugLogger {
    /// Create a new debug logger with a timestamped trace file under /tmp.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        Self::with_path(format!("/tmp/ga_reporting_mcp_trace_{}.log", timestamp))
    }

    /// Enabled logger tracing to the given path.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let (trace_file, trace_path) = match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => (Some(Mutex::new(file)), Some(path)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to create trace file");
                (None, None)
            }
        };

        Self {
            enabled: true,
            trace_file,
            trace_path,
        }
    }

    fn disabled() -> Self {
        Self {
            enabled: false,
            trace_file: None,
            trace_path: None,
        }
    }

    /// Get the trace file path.
    pub fn trace_path(&self) -> Option<&PathBuf> {
        self.trace_path.as_ref()
    }

    /// Log a message to the tracing subscriber and the trace file.
    pub fn log(&self, message: &str) {
        if !self.enabled {
            return;
        }

        tracing::debug!("{}", message);

        if let Some(ref file) = self.trace_file {
            if let Ok(mut f) = file.lock() {
                let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                let _ = writeln!(f, "[{}] {}", timestamp, message);
                let _ = f.flush();
            }
        }
    }

    /// Log a tool call.
    pub fn log_tool_call(&self, tool_name: &str, params: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        self.log(&format!(
            "TOOL CALL: {} | params: {}",
            tool_name,
            truncate_json(params, 1000)
        ));
    }

    /// Log a tool result.
    pub fn log_tool_result(&self, tool_name: &str, result: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        self.log(&format!(
            "TOOL RESULT: {} | result: {}",
            tool_name,
            truncate_json(result, 1000)
        ));
    }

    /// Log an error.
    pub fn log_error(&self, context: &str, error: &str) {
        if !self.enabled {
            return;
        }

        self.log(&format!("ERROR [{}]: {}", context, error));
    }
}

impl std::fmt::Debug for DebugLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugLogger")
            .field("enabled", &self.enabled)
            .field("trace_path", &self.trace_path)
            .finish()
    }
}

/// Truncate a JSON value to a maximum length.
fn truncate_json(value: &serde_json::Value, max_len: usize) -> String {
    let s = value.to_string();
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...(truncated)", &s[..idx]),
        None => s,
    }
}
