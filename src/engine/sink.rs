// src/engine/sink.rs
use std::io::Write;
use std::sync::Arc;
use parking_lot::Mutex;
use tracing::info;

/// Destination for workflow lifecycle lines.
pub trait LogSink: Send + Sync {
    fn line(&self, message: &str);
}

/// Writes timestamped lines to standard output.
#[derive(Debug, Clone)]
pub struct StdoutSink {
    prefix: String,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::with_prefix("[cloudflow] ")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn format(&self, message: &str) -> String {
        let now = chrono::Local::now();
        format!("{}{} {}", self.prefix, now.format("%Y/%m/%d %H:%M:%S"), message)
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for StdoutSink {
    fn line(&self, message: &str) {
        let line = self.format(message);
        let mut stdout = std::io::stdout().lock();
        // A closed stdout must not fail the workflow.
        let _ = writeln!(stdout, "{}", line);
    }
}

/// Forwards lifecycle lines to the installed `tracing` subscriber.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, message: &str) {
        info!(target: "cloudflow::workflow", "{}", message);
    }
}

/// Keeps every line in memory so callers can inspect a run afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn line(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }
}
