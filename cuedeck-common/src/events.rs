//! Event types for the Cuedeck event system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cuedeck event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeckEvent {
    /// A switch (take) to a new source began
    SourceSwitched {
        /// Registry index of the incoming source (None for inline sources)
        index: Option<usize>,
        name: String,
        source_id: Option<Uuid>,
        timestamp: DateTime<Utc>,
    },

    /// The transition renderer finished the in-flight transition
    TransitionComplete {
        index: Option<usize>,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// The live source reached its done condition
    SourceDone {
        index: Option<usize>,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// The pending switch queue changed (append, drain, clear, skip)
    PendingQueueChanged {
        depth: usize,
        timestamp: DateTime<Utc>,
    },

    /// Registry contents or ordering changed
    RegistryChanged {
        names: Vec<String>,
        selected: usize,
        active: Option<usize>,
        timestamp: DateTime<Utc>,
    },

    /// The selection moved to a different source
    SourceSelected {
        index: usize,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Safety gate toggled
    SafetyChanged {
        enabled: bool,
        timestamp: DateTime<Utc>,
    },

    /// A media file failed to open; playback continues degraded
    FileOpenFailed {
        index: Option<usize>,
        name: String,
        path: String,
        timestamp: DateTime<Utc>,
    },

    /// An entry was appended to the switch log ring
    LogAppended { entry: LogEntry },
}

impl DeckEvent {
    /// Event type string for SSE event naming.
    pub fn type_str(&self) -> &'static str {
        match self {
            DeckEvent::SourceSwitched { .. } => "SourceSwitched",
            DeckEvent::TransitionComplete { .. } => "TransitionComplete",
            DeckEvent::SourceDone { .. } => "SourceDone",
            DeckEvent::PendingQueueChanged { .. } => "PendingQueueChanged",
            DeckEvent::RegistryChanged { .. } => "RegistryChanged",
            DeckEvent::SourceSelected { .. } => "SourceSelected",
            DeckEvent::SafetyChanged { .. } => "SafetyChanged",
            DeckEvent::FileOpenFailed { .. } => "FileOpenFailed",
            DeckEvent::LogAppended { .. } => "LogAppended",
        }
    }
}

/// One entry in the switch log ring (newest first, capped at 10)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    /// Event name, e.g. "Take", "DeleteSource", "FileOpenFailed"
    pub event: String,
    /// Event payload as key/value detail
    pub detail: serde_json::Value,
    pub level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
}

impl LogEntry {
    pub fn new(event: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            time: Utc::now(),
            event: event.into(),
            detail,
            level: LogLevel::Info,
        }
    }

    pub fn error(event: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::new(event, detail)
        }
    }
}
