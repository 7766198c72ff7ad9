//! Named-category structured logger.
//!
//! Every category carries its own severity threshold which can be changed at
//! any time through [`Logger::set_severity`]. Records that pass the threshold
//! are forwarded to `tracing` (target `do_hierarchy`, with a `category` field)
//! and appended to a bounded in-memory history shared by all categories.
//! Adjusting thresholds never touches the history.

use crate::config::LoggingSettings;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Target used for every `tracing` event emitted by the registry.
pub const LOG_TARGET: &str = "do_hierarchy";

/// Log severity. Ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
}

impl Severity {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Severity::Error,
            1 => Severity::Warning,
            2 => Severity::Info,
            _ => Severity::Debug,
        }
    }

    /// Parses the level names accepted in configuration files.
    ///
    /// `warn` and `trace` are accepted as aliases so `tracing` style level
    /// strings can be reused.
    pub fn parse(level: &str) -> Option<Self> {
        match level.to_ascii_lowercase().as_str() {
            "error" => Some(Severity::Error),
            "warn" | "warning" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            "debug" | "trace" => Some(Severity::Debug),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// A single emitted log record as kept in the logger history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub severity: Severity,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    /// Looks up a structured field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
struct CategoryState {
    name: String,
    severity: AtomicU8,
}

#[derive(Debug)]
struct LoggerInner {
    default_severity: AtomicU8,
    categories: DashMap<String, Arc<CategoryState>>,
    history: Mutex<VecDeque<LogRecord>>,
    history_capacity: usize,
}

/// Registry of log categories sharing one record history.
///
/// Cloning a `Logger` yields another handle to the same categories and history.
#[derive(Debug, Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::from_settings(&LoggingSettings::default())
    }
}

impl Logger {
    /// Creates a logger with a default threshold and history capacity.
    pub fn new(default_severity: Severity, history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                default_severity: AtomicU8::new(default_severity as u8),
                categories: DashMap::new(),
                history: Mutex::new(VecDeque::with_capacity(history_capacity.min(1024))),
                history_capacity,
            }),
        }
    }

    /// Creates a logger seeded from configuration.
    ///
    /// Unknown level strings fall back to `info`; [`crate::config::HierarchyConfig::validate`]
    /// rejects them before this point in normal startup.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let default_severity = Severity::parse(&settings.level).unwrap_or(Severity::Info);
        let logger = Self::new(default_severity, settings.history_capacity);
        for (name, severity) in &settings.categories {
            logger.set_severity(name, *severity);
        }
        logger
    }

    /// Returns the category with the given name, creating it at the default
    /// threshold if it does not exist yet.
    pub fn category(&self, name: &str) -> LogCategory {
        let state = self
            .inner
            .categories
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(CategoryState {
                    name: name.to_string(),
                    severity: AtomicU8::new(self.inner.default_severity.load(Ordering::Relaxed)),
                })
            })
            .clone();

        LogCategory {
            state,
            logger: self.clone(),
        }
    }

    /// Sets the threshold of a category, creating it if needed.
    pub fn set_severity(&self, name: &str, severity: Severity) {
        self.category(name)
            .state
            .severity
            .store(severity as u8, Ordering::Relaxed);
    }

    /// Sets the threshold used for categories created from now on.
    pub fn set_default_severity(&self, severity: Severity) {
        self.inner
            .default_severity
            .store(severity as u8, Ordering::Relaxed);
    }

    /// Current threshold of a category, if it exists.
    pub fn severity(&self, name: &str) -> Option<Severity> {
        self.inner
            .categories
            .get(name)
            .map(|state| Severity::from_u8(state.severity.load(Ordering::Relaxed)))
    }

    /// Snapshot of the retained history, oldest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.history().iter().cloned().collect()
    }

    /// Retained records of one category, oldest first.
    pub fn records_for(&self, category: &str) -> Vec<LogRecord> {
        self.history()
            .iter()
            .filter(|record| record.category == category)
            .cloned()
            .collect()
    }

    /// Removes and returns the retained history.
    pub fn drain(&self) -> Vec<LogRecord> {
        self.history().drain(..).collect()
    }

    fn history(&self) -> std::sync::MutexGuard<'_, VecDeque<LogRecord>> {
        // A panic while holding the lock cannot leave the deque half-written.
        self.inner
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn append(&self, record: LogRecord) {
        if self.inner.history_capacity == 0 {
            return;
        }
        let mut history = self.history();
        while history.len() >= self.inner.history_capacity {
            history.pop_front();
        }
        history.push_back(record);
    }
}

/// Handle to a single named category.
#[derive(Debug, Clone)]
pub struct LogCategory {
    state: Arc<CategoryState>,
    logger: Logger,
}

impl LogCategory {
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn severity(&self) -> Severity {
        Severity::from_u8(self.state.severity.load(Ordering::Relaxed))
    }

    /// Changes this category's threshold at runtime.
    pub fn set_severity(&self, severity: Severity) {
        self.state.severity.store(severity as u8, Ordering::Relaxed);
    }

    pub fn is_enabled(&self, severity: Severity) -> bool {
        severity <= self.severity()
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message, Vec::new());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Severity::Warning, message, Vec::new());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message, Vec::new());
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message, Vec::new());
    }

    /// Emits a record with structured fields.
    ///
    /// Returns whether the record passed the threshold.
    pub fn log(
        &self,
        severity: Severity,
        message: impl Into<String>,
        fields: Vec<(String, String)>,
    ) -> bool {
        if !self.is_enabled(severity) {
            return false;
        }

        let record = LogRecord {
            timestamp: Utc::now(),
            category: self.state.name.clone(),
            severity,
            message: message.into(),
            fields,
        };
        forward_to_tracing(&record);
        self.logger.append(record);
        true
    }
}

fn forward_to_tracing(record: &LogRecord) {
    let fields = record
        .fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    let category = record.category.as_str();

    match record.severity {
        Severity::Error => error!(target: LOG_TARGET, category, %fields, "{}", record.message),
        Severity::Warning => warn!(target: LOG_TARGET, category, %fields, "{}", record.message),
        Severity::Info => info!(target: LOG_TARGET, category, %fields, "{}", record.message),
        Severity::Debug => debug!(target: LOG_TARGET, category, %fields, "{}", record.message),
    }
}
