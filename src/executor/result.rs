// Per-host results and the output a task hands back

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::executor::{Context, Task};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::SharedError;

/// Opaque, task-defined payload carried by a result
///
/// Anything `Debug + Display + Send + Sync` qualifies. Recover the concrete
/// type with `JobResult::data_as`.
pub trait Payload: fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
}

impl<T> Payload for T
where
    T: fmt::Debug + fmt::Display + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What a successful `Task::run` produces
#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    pub data: Option<Arc<dyn Payload>>,
    pub changed: bool,
    pub sub_results: Vec<JobResult>,
}

impl TaskOutput {
    pub fn new(data: impl Payload) -> Self {
        TaskOutput {
            data: Some(Arc::new(data)),
            ..Default::default()
        }
    }

    /// No payload
    pub fn empty() -> Self {
        TaskOutput::default()
    }

    pub fn changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn with_sub_result(mut self, result: JobResult) -> Self {
        self.sub_results.push(result);
        self
    }
}

/// Outcome of one task against one host
///
/// Built by the execution wrapper (or by a composite task for its
/// sub-tasks) and never mutated once it has been sent to a result queue.
#[derive(Debug, Clone)]
pub struct JobResult {
    host: Arc<Host>,
    err: Option<SharedError>,
    changed: bool,
    data: Option<Arc<dyn Payload>>,
    sub_results: Vec<JobResult>,
}

impl JobResult {
    pub fn new(host: Arc<Host>) -> Self {
        JobResult {
            host,
            err: None,
            changed: false,
            data: None,
            sub_results: Vec::new(),
        }
    }

    /// Build a result from what a task returned
    pub fn from_outcome(host: Arc<Host>, outcome: Result<TaskOutput, SharedError>) -> Self {
        match outcome {
            Ok(output) => JobResult {
                host,
                err: None,
                changed: output.changed,
                data: output.data,
                sub_results: output.sub_results,
            },
            Err(err) => JobResult::new(host).with_err(err),
        }
    }

    pub fn with_err(mut self, err: SharedError) -> Self {
        self.err = Some(err);
        self
    }

    pub fn set_changed(&mut self, changed: bool) {
        self.changed = changed;
    }

    pub fn set_data(&mut self, data: impl Payload) {
        self.data = Some(Arc::new(data));
    }

    pub fn add_sub_result(&mut self, result: JobResult) {
        self.sub_results.push(result);
    }

    pub fn host(&self) -> &Arc<Host> {
        &self.host
    }

    /// This result's own error, ignoring sub-results
    pub fn err(&self) -> Option<&SharedError> {
        self.err.as_ref()
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn data(&self) -> Option<&dyn Payload> {
        self.data.as_deref()
    }

    /// The payload as a concrete type, if it is one
    pub fn data_as<T: 'static>(&self) -> Option<&T> {
        self.data().and_then(|p| p.as_any().downcast_ref::<T>())
    }

    pub fn sub_results(&self) -> &[JobResult] {
        &self.sub_results
    }

    /// Own error, else the first error found depth-first through the
    /// sub-results in insertion order
    pub fn any_err(&self) -> Option<&SharedError> {
        self.err
            .as_ref()
            .or_else(|| self.sub_results.iter().find_map(JobResult::any_err))
    }

    /// True if this result or any sub-result changed something
    pub fn any_changed(&self) -> bool {
        self.changed || self.sub_results.iter().any(JobResult::any_changed)
    }
}

/// Run `task` as a sub-task of a composite, producing its `JobResult`
///
/// Unlike the top-level execution wrapper this neither calls processors nor
/// touches the host's last error; the parent result surfaces the error
/// through `any_err()`.
pub async fn run_subtask(
    ctx: &Context,
    logger: &dyn Logger,
    task: &dyn Task,
    host: &Arc<Host>,
) -> JobResult {
    let outcome = match ctx.err() {
        Some(err) => Err(err),
        None => task.run(ctx, logger, host).await,
    };

    JobResult::from_outcome(host.clone(), outcome.map_err(Arc::new))
}
