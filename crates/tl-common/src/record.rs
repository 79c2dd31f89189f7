//! Structured log records handed to the sink.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Level;

/// Output of an upstream formatter, overriding parts of the raw record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattedParts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Map<String, Value>>,
}

/// A single log entry as produced by the logging pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub channel: String,
    pub level: Level,
    pub message: String,

    /// Event time, serialized as epoch seconds.
    #[serde(with = "chrono::serde::ts_seconds", alias = "time")]
    pub timestamp: DateTime<Utc>,

    /// Values supplied at the log call site.
    #[serde(default)]
    pub context: Map<String, Value>,

    /// Values attached by upstream processors.
    #[serde(default)]
    pub extra: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<FormattedParts>,
}

impl LogRecord {
    pub fn new(channel: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
            context: Map::new(),
            extra: Map::new(),
            formatted: None,
        }
    }

    /// Set the event time from epoch seconds. Out-of-range values keep the
    /// current timestamp.
    pub fn at(mut self, epoch_seconds: i64) -> Self {
        if let Some(ts) = Utc.timestamp_opt(epoch_seconds, 0).single() {
            self.timestamp = ts;
        }
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_formatted(mut self, formatted: FormattedParts) -> Self {
        self.formatted = Some(formatted);
        self
    }

    /// The formatted message when available, the raw message otherwise.
    pub fn effective_message(&self) -> &str {
        self.formatted
            .as_ref()
            .and_then(|f| f.message.as_deref())
            .unwrap_or(&self.message)
    }

    /// The formatted context when available, the raw context otherwise.
    pub fn effective_context(&self) -> &Map<String, Value> {
        self.formatted
            .as_ref()
            .and_then(|f| f.context.as_ref())
            .unwrap_or(&self.context)
    }

    /// The formatted extra map when available, the raw extra map otherwise.
    pub fn effective_extra(&self) -> &Map<String, Value> {
        self.formatted
            .as_ref()
            .and_then(|f| f.extra.as_ref())
            .unwrap_or(&self.extra)
    }

    /// Epoch seconds stored in the `time` column.
    pub fn epoch_seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }
}
