// Output module for Armada

pub mod errors;
pub mod json_output;
pub mod terminal;

pub use errors::*;
pub use json_output::*;
pub use terminal::*;

use serde::Serialize;

use crate::executor::JobResult;

/// Output format for rendered results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text output with colors
    #[default]
    Text,
    /// Machine-readable JSON output (NDJSON format)
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}' (expected text or json)", other)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Tally of the results a renderer consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ok: usize,
    pub changed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn record(&mut self, result: &JobResult) {
        if result.any_err().is_some() {
            self.failed += 1;
        } else if result.any_changed() {
            self.changed += 1;
        } else {
            self.ok += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.ok + self.changed + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
