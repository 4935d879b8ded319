// Logging: the engine-facing Logger trait and tracing setup
//
// Level priority for the binary:
// 1. `-v` / `-vv` on the command line
// 2. `ARMADA_LOG`, then `RUST_LOG` (full EnvFilter syntax)
// 3. default to `info`

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Structured logger handed to runners, processors and tasks
///
/// `with_field` never mutates the receiver; it returns a new logger carrying
/// the extra key/value pair on every subsequent line.
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str);
    fn debug(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
    /// Log and terminate the process
    fn fatal(&self, msg: &str);
    fn with_field(&self, key: &str, value: &dyn fmt::Display) -> Arc<dyn Logger>;
}

/// Logger backed by `tracing` events
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    fields: Vec<(String, String)>,
}

impl TracingLogger {
    pub fn new() -> Self {
        TracingLogger::default()
    }

    /// The accumulated fields rendered as `key=value` pairs
    pub fn fields(&self) -> String {
        render_fields(&self.fields)
    }
}

impl Logger for TracingLogger {
    fn info(&self, msg: &str) {
        tracing::info!(fields = %self.fields(), "{}", msg);
    }

    fn debug(&self, msg: &str) {
        tracing::debug!(fields = %self.fields(), "{}", msg);
    }

    fn warn(&self, msg: &str) {
        tracing::warn!(fields = %self.fields(), "{}", msg);
    }

    fn error(&self, msg: &str) {
        tracing::error!(fields = %self.fields(), "{}", msg);
    }

    fn fatal(&self, msg: &str) {
        tracing::error!(fields = %self.fields(), fatal = true, "{}", msg);
        std::process::exit(1);
    }

    fn with_field(&self, key: &str, value: &dyn fmt::Display) -> Arc<dyn Logger> {
        let mut fields = self.fields.clone();
        fields.push((key.to_string(), value.to_string()));
        Arc::new(TracingLogger { fields })
    }
}

/// Logger that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn fatal(&self, _msg: &str) {}

    fn with_field(&self, _key: &str, _value: &dyn fmt::Display) -> Arc<dyn Logger> {
        Arc::new(NullLogger)
    }
}

/// One captured line from a `MemoryLogger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: &'static str,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

/// Logger that keeps every line in memory; loggers derived through
/// `with_field` append to the same buffer. `fatal` is recorded, not fatal.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    fields: Vec<(String, String)>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        MemoryLogger::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Messages logged at `level`, in order
    pub fn messages(&self, level: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    fn push(&self, level: &'static str, msg: &str) {
        self.entries.lock().push(LogEntry {
            level,
            message: msg.to_string(),
            fields: self.fields.clone(),
        });
    }
}

impl Logger for MemoryLogger {
    fn info(&self, msg: &str) {
        self.push("info", msg);
    }

    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }

    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }

    fn error(&self, msg: &str) {
        self.push("error", msg);
    }

    fn fatal(&self, msg: &str) {
        self.push("fatal", msg);
    }

    fn with_field(&self, key: &str, value: &dyn fmt::Display) -> Arc<dyn Logger> {
        let mut fields = self.fields.clone();
        fields.push((key.to_string(), value.to_string()));
        Arc::new(MemoryLogger {
            entries: self.entries.clone(),
            fields,
        })
    }
}

fn render_fields(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Initialise the global tracing subscriber, writing to stderr.
///
/// Call once at startup.
pub fn init_logging(verbose: u8) -> Result<()> {
    let filter = match verbose {
        0 => std::env::var("ARMADA_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .and_then(|s| EnvFilter::try_new(s).ok())
            .unwrap_or_else(|| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    Ok(())
}
