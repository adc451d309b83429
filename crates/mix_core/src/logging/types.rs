//! Logging configuration and message decoration.

/// Severity levels for job log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Callback receiving every formatted log line (e.g. for live streaming).
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Configuration for a job logger.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level written.
    pub level: LogLevel,
    /// Prefix lines with a wall-clock timestamp.
    pub show_timestamps: bool,
    /// Number of recent lines kept for error diagnosis.
    pub tail_lines: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            show_timestamps: true,
            tail_lines: 100,
        }
    }
}

/// Standard prefixes decorating job log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePrefix {
    /// A stage boundary.
    Phase,
    /// A measurement worth surfacing.
    Measure,
    /// Completion marker.
    Success,
    Warning,
    Error,
}

impl MessagePrefix {
    /// Decorate a message with this prefix.
    pub fn format(&self, message: &str) -> String {
        match self {
            MessagePrefix::Phase => format!("=== {} ===", message),
            MessagePrefix::Measure => format!("[measure] {}", message),
            MessagePrefix::Success => format!("[ok] {}", message),
            MessagePrefix::Warning => format!("[warn] {}", message),
            MessagePrefix::Error => format!("[error] {}", message),
        }
    }
}
