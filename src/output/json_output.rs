// JSON output for machine consumption (NDJSON)

use std::io::Write;

use serde_json::json;
use tokio::sync::mpsc;

use super::RunSummary;
use crate::executor::JobResult;
use crate::output::errors::ArmadaError;

/// A result (and its sub-results) as a JSON value
pub fn result_to_json(result: &JobResult) -> serde_json::Value {
    json!({
        "host": result.host().hostname,
        "changed": result.changed(),
        "any_changed": result.any_changed(),
        "error": result.err().map(|e| e.to_string()),
        "any_error": result.any_err().map(|e| e.to_string()),
        "data": result.data().map(|d| d.to_string()),
        "sub_results": result.sub_results().iter().map(result_to_json).collect::<Vec<_>>(),
    })
}

/// Drain `results`, emitting one JSON object per line
///
/// Lines: a `run_start` event with the title, a `host_result` event per
/// result, then `run_complete` with the tally.
pub async fn render_results_json<W: Write>(
    wr: &mut W,
    results: &mut mpsc::Receiver<JobResult>,
    title: &str,
) -> Result<RunSummary, ArmadaError> {
    emit(
        wr,
        json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "event": "run_start",
            "title": title,
        }),
    )?;

    let mut summary = RunSummary::default();
    while let Some(result) = results.recv().await {
        let mut event = result_to_json(&result);
        event["timestamp"] = json!(chrono::Utc::now().to_rfc3339());
        event["event"] = json!("host_result");
        emit(wr, event)?;
        summary.record(&result);
    }

    let mut done = json!(summary);
    done["timestamp"] = json!(chrono::Utc::now().to_rfc3339());
    done["event"] = json!("run_complete");
    done["title"] = json!(title);
    emit(wr, done)?;

    Ok(summary)
}

fn emit<W: Write>(wr: &mut W, event: serde_json::Value) -> Result<(), ArmadaError> {
    writeln!(wr, "{}", event).map_err(|e| ArmadaError::Io {
        message: "problem writing results".to_string(),
        path: None,
        source: e,
    })
}
