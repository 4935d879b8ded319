// Composite task: several tasks in order on the same host

use std::sync::Arc;

use async_trait::async_trait;

use crate::executor::{run_subtask, Context, Task, TaskMetadata, TaskOutput};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

/// Runs its tasks sequentially, one sub-result each
///
/// The group itself never fails: sub-task errors stay on the sub-results
/// and surface through `JobResult::any_err`. With `stop_on_error` the
/// remaining tasks are skipped after the first failure.
#[derive(Clone)]
pub struct TaskGroup {
    name: String,
    tasks: Vec<Arc<dyn Task>>,
    stop_on_error: bool,
    meta: Option<TaskMetadata>,
}

impl TaskGroup {
    pub fn new(name: impl Into<String>) -> Self {
        TaskGroup {
            name: name.into(),
            tasks: Vec::new(),
            stop_on_error: false,
            meta: None,
        }
    }

    pub fn with_task(mut self, task: Arc<dyn Task>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn with_metadata(mut self, identifier: impl Into<String>) -> Self {
        self.meta = Some(TaskMetadata::new(identifier));
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl Task for TaskGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<&TaskMetadata> {
        self.meta.as_ref()
    }

    async fn run(
        &self,
        ctx: &Context,
        logger: &dyn Logger,
        host: &Arc<Host>,
    ) -> Result<TaskOutput, ArmadaError> {
        let mut output = TaskOutput::empty();

        for task in &self.tasks {
            let sub_logger = logger.with_field("subtask", &task.display_name());
            let result = run_subtask(ctx, sub_logger.as_ref(), task.as_ref(), host).await;
            let failed = result.err().is_some();

            output = output.with_sub_result(result);
            if failed && self.stop_on_error {
                logger.debug("stopping group after failed subtask");
                break;
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::JobResult;
    use crate::logging::NullLogger;
    use crate::tasks::FnTask;

    fn step(name: &'static str, fail: bool, changed: bool) -> Arc<dyn Task> {
        Arc::new(FnTask::new(name, move |_ctx, _host| async move {
            if fail {
                Err(ArmadaError::task(format!("{} failed", name)))
            } else {
                Ok(TaskOutput::new(name.to_string()).changed(changed))
            }
        }))
    }

    async fn run(group: &TaskGroup) -> JobResult {
        let host = Arc::new(Host::new("dev1"));
        let outcome = group
            .run(&Context::background(), &NullLogger, &host)
            .await
            .map_err(Arc::new);
        JobResult::from_outcome(host, outcome)
    }

    #[tokio::test]
    async fn test_group_aggregates_sub_results() {
        let group = TaskGroup::new("deploy")
            .with_task(step("fetch", false, true))
            .with_task(step("verify", true, false))
            .with_task(step("restart", false, false));

        let result = run(&group).await;

        assert_eq!(result.sub_results().len(), 3);
        assert!(result.err().is_none());
        assert_eq!(result.any_err().unwrap().to_string(), "verify failed");
        assert!(result.any_changed());
        assert!(!result.changed());
    }

    #[tokio::test]
    async fn test_stop_on_error() {
        let group = TaskGroup::new("deploy")
            .with_task(step("fetch", true, false))
            .with_task(step("restart", false, true))
            .stop_on_error(true);

        let result = run(&group).await;

        assert_eq!(result.sub_results().len(), 1);
        assert!(!result.any_changed());
        assert_eq!(group.len(), 2);
    }
}
