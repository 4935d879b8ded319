// Built-in lifecycle processors and the --callback argument parser

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;

use super::{Processor, RenderProcessor};
use crate::executor::{Context, JobResult, Task};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

/// JSON log processor - appends lifecycle events to a file, one per line
pub struct JsonLogProcessor {
    file: Arc<Mutex<File>>,
}

impl JsonLogProcessor {
    /// Create a JSON log processor appending to the specified file
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ArmadaError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ArmadaError::Io {
                message: "problem opening json log".to_string(),
                path: Some(path.clone()),
                source: e,
            })?;

        Ok(JsonLogProcessor {
            file: Arc::new(Mutex::new(file)),
        })
    }

    fn write_event(&self, event: serde_json::Value) -> Result<(), ArmadaError> {
        let mut file = self.file.lock();
        writeln!(file, "{}", event)
            .and_then(|_| file.flush())
            .map_err(|e| ArmadaError::Io {
                message: "problem writing json log".to_string(),
                path: None,
                source: e,
            })
    }
}

#[async_trait]
impl Processor for JsonLogProcessor {
    async fn task_started(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        self.write_event(json!({
            "event": "task_started",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "task": task.display_name(),
        }))
    }

    async fn task_instance_started(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        host: &Arc<Host>,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        self.write_event(json!({
            "event": "task_instance_started",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "task": task.display_name(),
            "host": host.hostname,
        }))
    }

    async fn task_instance_completed(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        result: &JobResult,
        host: &Arc<Host>,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        self.write_event(json!({
            "event": "task_instance_completed",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "task": task.display_name(),
            "host": host.hostname,
            "changed": result.any_changed(),
            "failed": result.any_err().is_some(),
            "error": result.any_err().map(|e| e.to_string()),
        }))
    }

    async fn task_completed(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        self.write_event(json!({
            "event": "task_completed",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "task": task.display_name(),
        }))
    }
}

/// Timer processor - measures how long each host took
///
/// The clock runs from `task_instance_started` to
/// `task_instance_completed`; a summary is logged at `task_completed`.
/// Hosts are tracked by handle, so two inventory entries sharing a hostname
/// are timed separately. `task_started` resets the previous run.
#[derive(Default)]
pub struct TimerProcessor {
    started: DashMap<usize, Instant>,
    durations: Mutex<HashMap<usize, (String, Duration)>>,
}

fn host_id(host: &Arc<Host>) -> usize {
    Arc::as_ptr(host) as usize
}

impl TimerProcessor {
    pub fn new() -> Self {
        TimerProcessor::default()
    }

    /// Per-host durations recorded so far, slowest first
    pub fn durations(&self) -> Vec<(String, Duration)> {
        let mut all: Vec<(String, Duration)> = self
            .durations
            .lock()
            .values()
            .map(|(h, d)| (h.clone(), *d))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        all
    }
}

#[async_trait]
impl Processor for TimerProcessor {
    async fn task_started(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        self.started.clear();
        self.durations.lock().clear();
        Ok(())
    }

    async fn task_instance_started(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        host: &Arc<Host>,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        self.started.insert(host_id(host), Instant::now());
        Ok(())
    }

    async fn task_instance_completed(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        _result: &JobResult,
        host: &Arc<Host>,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        if let Some((id, start)) = self.started.remove(&host_id(host)) {
            self.durations
                .lock()
                .insert(id, (host.hostname.clone(), start.elapsed()));
        }
        Ok(())
    }

    async fn task_completed(
        &self,
        _ctx: &Context,
        logger: &dyn Logger,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        let durations = self.durations();
        let total: Duration = durations.iter().map(|(_, d)| *d).sum();

        if let Some((slowest, d)) = durations.first() {
            logger.info(&format!(
                "{}: {} hosts, {:.2}s total, slowest {} ({:.2}s)",
                task.display_name(),
                durations.len(),
                total.as_secs_f64(),
                slowest,
                d.as_secs_f64()
            ));
        }
        Ok(())
    }
}

/// Split a `--callback` argument into name and arguments
/// Format: "name:args" or just "name"
pub fn parse_processor_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(':') {
        Some((name, args)) => (name, Some(args)),
        None => (spec, None),
    }
}

/// Create a processor from a `--callback` argument
///
/// Known: `json_log:<path>`, `timer`, `render` (stdout, coloured) and
/// `render_plain`.
pub fn create_processor(spec: &str) -> Result<Arc<dyn Processor>, ArmadaError> {
    let (name, args) = parse_processor_spec(spec);

    match name {
        "json_log" => {
            let path = args.filter(|p| !p.is_empty()).ok_or_else(|| {
                ArmadaError::task(
                    "json_log callback requires a file path (e.g., json_log:/tmp/armada.json)",
                )
            })?;
            Ok(Arc::new(JsonLogProcessor::new(path)?))
        }

        "timer" => Ok(Arc::new(TimerProcessor::new())),

        "render" => Ok(Arc::new(RenderProcessor::stdout(true))),

        "render_plain" => Ok(Arc::new(RenderProcessor::stdout(false))),

        _ => Err(ArmadaError::task(format!("Unknown callback plugin: {}", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskOutput;
    use crate::logging::MemoryLogger;

    struct Noop;

    #[async_trait]
    impl Task for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        async fn run(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            _host: &Arc<Host>,
        ) -> Result<TaskOutput, ArmadaError> {
            Ok(TaskOutput::empty())
        }
    }

    #[test]
    fn test_parse_processor_spec() {
        assert_eq!(parse_processor_spec("timer"), ("timer", None));
        assert_eq!(
            parse_processor_spec("json_log:/tmp/log.json"),
            ("json_log", Some("/tmp/log.json"))
        );
    }

    #[test]
    fn test_create_processor() {
        assert!(create_processor("timer").is_ok());
        assert!(create_processor("json_log").is_err());
        assert!(create_processor("webhook:http://x").is_err());
    }

    #[tokio::test]
    async fn test_json_log_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let log = JsonLogProcessor::new(&path).unwrap();

        let ctx = Context::background();
        let logger = MemoryLogger::new();
        let host = Arc::new(Host::new("dev1"));
        let result = JobResult::new(host.clone());

        log.task_started(&ctx, &logger, &Noop).await.unwrap();
        log.task_instance_started(&ctx, &logger, &host, &Noop)
            .await
            .unwrap();
        log.task_instance_completed(&ctx, &logger, &result, &host, &Noop)
            .await
            .unwrap();
        log.task_completed(&ctx, &logger, &Noop).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let events: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        let names: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            vec![
                "task_started",
                "task_instance_started",
                "task_instance_completed",
                "task_completed"
            ]
        );
        assert_eq!(events[2]["host"], "dev1");
        assert_eq!(events[2]["failed"], false);
    }

    #[tokio::test]
    async fn test_timer_records_hosts() {
        let timer = TimerProcessor::new();
        let ctx = Context::background();
        let logger = MemoryLogger::new();

        for name in ["dev1", "dev2"] {
            let host = Arc::new(Host::new(name));
            timer
                .task_instance_started(&ctx, &logger, &host, &Noop)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            timer
                .task_instance_completed(&ctx, &logger, &JobResult::new(host.clone()), &host, &Noop)
                .await
                .unwrap();
        }
        timer.task_completed(&ctx, &logger, &Noop).await.unwrap();

        let durations = timer.durations();
        assert_eq!(durations.len(), 2);
        assert!(durations.iter().all(|(_, d)| *d >= Duration::from_millis(5)));
        assert_eq!(logger.messages("info").len(), 1);
    }

    async fn time_hosts(timer: &TimerProcessor, logger: &MemoryLogger, hosts: &[Arc<Host>]) {
        let ctx = Context::background();
        timer.task_started(&ctx, logger, &Noop).await.unwrap();
        for host in hosts {
            timer
                .task_instance_started(&ctx, logger, host, &Noop)
                .await
                .unwrap();
            timer
                .task_instance_completed(&ctx, logger, &JobResult::new(host.clone()), host, &Noop)
                .await
                .unwrap();
        }
        timer.task_completed(&ctx, logger, &Noop).await.unwrap();
    }

    #[tokio::test]
    async fn test_timer_shared_hostname_and_reset_between_runs() {
        let timer = TimerProcessor::new();
        let logger = MemoryLogger::new();

        let a = Arc::new(Host::new("shared.example.com"));
        let b = Arc::new(Host::new("shared.example.com"));
        time_hosts(&timer, &logger, &[a, b]).await;

        assert_eq!(timer.durations().len(), 2);
        assert!(logger.messages("info")[0].contains("2 hosts"));

        let other = Arc::new(Host::new("other"));
        time_hosts(&timer, &logger, &[other]).await;

        let names: Vec<String> = timer.durations().into_iter().map(|(h, _)| h).collect();
        assert_eq!(names, vec!["other".to_string()]);
        assert!(logger.messages("info")[1].contains("1 hosts"));
    }
}
