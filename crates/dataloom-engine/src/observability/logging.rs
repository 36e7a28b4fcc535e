//! Structured logging configuration.
//!
//! This module provides functions for configuring structured JSON logging
//! using `tracing-subscriber`.
//!
//! # Log Format
//!
//! When JSON formatting is enabled, log entries are output as JSON objects:
//!
//! ```json
//! {"timestamp":"2024-01-15T10:30:00.000Z","level":"DEBUG","target":"dataloom_engine::handlers::aggregate::aggregator","fields":{"message":"dispatching batched get_many","resource":"posts","ids":4}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dataloom_engine::observability::{init_logging, LoggingConfig};
//!
//! // Initialize from the loaded engine configuration
//! init_logging(LoggingConfig::from(&config.logging));
//!
//! // Or pick a format directly
//! init_logging(LoggingConfig::text().with_level(tracing::Level::DEBUG));
//! ```

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::LoggingSettings;

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to use JSON format (true) or text format (false)
    pub json_format: bool,
    /// The default log level if RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include span events (enter/exit)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration for JSON output.
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    /// Create a new logging configuration for text output (development).
    pub fn text() -> Self {
        Self {
            json_format: false,
            ..Default::default()
        }
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Include span events in the output.
    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }
}

impl From<&LoggingSettings> for LoggingConfig {
    /// Unknown levels fall back to INFO; `EngineConfig::validate` rejects
    /// them before this point.
    fn from(settings: &LoggingSettings) -> Self {
        let level = Level::from_str(&settings.level).unwrap_or(Level::INFO);
        Self {
            json_format: settings.json,
            default_level: level,
            include_spans: false,
        }
    }
}

/// Initialize the logging subsystem with the given configuration.
///
/// This should be called once at application startup. If called multiple times,
/// subsequent calls will have no effect (the subscriber is global).
pub fn init_logging(config: LoggingConfig) {
    // Build the filter from RUST_LOG env var or use default level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        );

        // Try to set as global default, ignore if already set
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true),
        );

        // Try to set as global default, ignore if already set
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Creates a JSON-formatted subscriber writing to `writer`.
///
/// Used by tests to capture and inspect the engine's log output.
pub fn create_json_layer<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(EnvFilter::new("trace"))
        .with(
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use dataloom_core::RecordCache;
    use dataloom_provider::{Identifier, MemoryDataProvider, Record};

    use crate::handlers::aggregate::{AggregatorConfig, RequestAggregator};

    /// A writer that captures output to a shared buffer.
    #[derive(Clone)]
    struct CaptureWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl CaptureWriter {
        fn new() -> Self {
            Self {
                buffer: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn get_output(&self) -> String {
            let buffer = self.buffer.lock().unwrap();
            String::from_utf8_lossy(&buffer).to_string()
        }
    }

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.json_format);
        assert_eq!(config.default_level, Level::INFO);
        assert!(!config.include_spans);
    }

    #[test]
    fn test_logging_config_builders() {
        assert!(LoggingConfig::json().json_format);
        assert!(!LoggingConfig::text().json_format);
        assert_eq!(
            LoggingConfig::default().with_level(Level::DEBUG).default_level,
            Level::DEBUG
        );
        assert!(LoggingConfig::default().with_spans().include_spans);
    }

    #[test]
    fn test_logging_config_from_settings() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            json: true,
        };

        let config = LoggingConfig::from(&settings);

        assert!(config.json_format);
        assert_eq!(config.default_level, Level::WARN);
    }

    /// Test: Batch dispatch is logged as structured JSON
    #[test]
    fn test_batch_dispatch_logs_are_json_formatted() {
        // Arrange
        let writer = CaptureWriter::new();
        let subscriber = create_json_layer(writer.clone());
        let provider = Arc::new(MemoryDataProvider::new().with_records("posts", [Record::new(1)]));
        let aggregator = RequestAggregator::new(
            provider,
            Arc::new(RecordCache::default()),
            AggregatorConfig::default(),
        );

        // Act
        tracing::subscriber::with_default(subscriber, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                aggregator
                    .request("posts", &[Identifier::from(1)])
                    .await
                    .unwrap();
            });
        });

        // Assert
        let output = writer.get_output();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str(line).expect("log line should be valid JSON"))
            .collect();
        let dispatch = lines
            .iter()
            .find(|json| json["fields"]["message"] == "dispatching batched get_many")
            .expect("dispatch should be logged");

        assert_eq!(dispatch["level"], "DEBUG");
        assert_eq!(dispatch["fields"]["resource"], "posts");
        assert_eq!(dispatch["fields"]["ids"], 1);
        assert!(dispatch.get("target").is_some());
    }
}
