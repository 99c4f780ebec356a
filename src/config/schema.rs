use serde::{Serialize, Deserialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{LogSink, PollSettings, StdoutSink, TracingSink};

/// Runner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Delay between job status polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Give up on a polled job after this many seconds
    pub timeout_secs: u64,
    pub log_sink: SinkKind,
    /// Root directory of the local object store
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
    /// Base URL used for `invoke` steps that do not name their own endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_endpoint: Option<String>,
}

/// Where workflow lifecycle lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Stdout,
    Tracing,
}

fn default_store_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloudflow/store")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            timeout_secs: 60,
            log_sink: SinkKind::Stdout,
            store_root: default_store_root(),
            function_endpoint: None,
        }
    }
}

impl Settings {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn log_sink(&self) -> Arc<dyn LogSink> {
        match self.log_sink {
            SinkKind::Stdout => Arc::new(StdoutSink::new()),
            SinkKind::Tracing => Arc::new(TracingSink),
        }
    }
}
