// Text rendering of a result stream

use std::fmt::Write as _;
use std::io::Write;

use colored::{Color, Colorize};
use tokio::sync::mpsc;

use super::RunSummary;
use crate::executor::JobResult;
use crate::output::errors::ArmadaError;

pub(crate) fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

/// Colour for a host line: red on any error, green when nothing changed,
/// yellow otherwise
pub fn result_color(result: &JobResult) -> Color {
    if result.any_err().is_some() {
        Color::Red
    } else if !result.any_changed() {
        Color::Green
    } else {
        Color::Yellow
    }
}

/// Render one result (and its sub-results) into `buf`
pub fn render_result(buf: &mut String, result: &JobResult, color: bool) {
    render_inner(buf, result, color, true);
}

fn render_inner(buf: &mut String, result: &JobResult, color: bool, with_host: bool) {
    if with_host {
        let line = format!("@ {}", result.host().hostname);
        let _ = writeln!(buf, "{}", paint(&line, result_color(result), color));
    }

    if let Some(data) = result.data() {
        let _ = writeln!(buf, "{}", data);
    }
    if let Some(err) = result.err() {
        let _ = writeln!(buf, "  - err: {}", err);
    }
    buf.push('\n');

    for (i, sub) in result.sub_results().iter().enumerate() {
        let line = format!("**** subtask {}", i);
        let _ = writeln!(buf, "{}", paint(&line, Color::Cyan, color));
        render_inner(buf, sub, color, false);
    }
}

/// Drain `results`, writing `# title` followed by every result as it arrives
pub async fn render_results<W: Write>(
    wr: &mut W,
    results: &mut mpsc::Receiver<JobResult>,
    title: &str,
    color: bool,
) -> Result<RunSummary, ArmadaError> {
    let io_err = |e: std::io::Error| ArmadaError::Io {
        message: "problem writing results".to_string(),
        path: None,
        source: e,
    };

    writeln!(wr, "{}", paint(&format!("# {}", title), Color::Blue, color)).map_err(io_err)?;

    let mut summary = RunSummary::default();
    while let Some(result) = results.recv().await {
        let mut buf = String::new();
        render_result(&mut buf, &result, color);
        wr.write_all(buf.as_bytes()).map_err(io_err)?;
        summary.record(&result);
    }

    wr.flush().map_err(io_err)?;
    Ok(summary)
}
