// Execution wrapper: the single place a task meets a host

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use super::{Context, JobResult, Task, TaskOutput};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::{ArmadaError, SharedError};
use crate::plugins::Processors;

/// Run `task` against `host` and push exactly one `JobResult` to `results`
///
/// Sequence: `task_instance_started` hooks, the task itself, record the
/// error on the host, `task_instance_completed` hooks, push.
///
/// - If an instance-started hook fails the task is skipped; the result
///   carries the wrapped hook error, which also becomes the host's last
///   error.
/// - If an instance-completed hook fails the result is still pushed
///   unchanged and the hook error is returned.
/// - A context that is already done skips the task and yields its
///   cancellation error; a panicking task yields `TaskPanicked`.
///
/// The only way no result is pushed is a closed result queue.
pub async fn task_wrapper(
    ctx: &Context,
    logger: &dyn Logger,
    processors: &Processors,
    task: &dyn Task,
    host: &Arc<Host>,
    results: &mpsc::Sender<JobResult>,
) -> Result<(), SharedError> {
    let mut hook_err: Option<SharedError> = None;

    let outcome: Result<TaskOutput, SharedError> =
        match processors.task_instance_started(ctx, logger, host, task).await {
            Err(e) => {
                let e = Arc::new(e);
                hook_err = Some(e.clone());
                Err(e)
            }
            Ok(()) => execute(ctx, logger, task, host).await.map_err(Arc::new),
        };

    host.set_err(outcome.as_ref().err().cloned());
    if let Err(e) = &outcome {
        logger.debug(&format!("task failed: {}", e));
    }

    let result = JobResult::from_outcome(host.clone(), outcome);

    if let Err(e) = processors
        .task_instance_completed(ctx, logger, &result, host, task)
        .await
    {
        logger.error(&e.to_string());
        hook_err = Some(Arc::new(e));
    }

    results
        .send(result)
        .await
        .map_err(|_| ArmadaError::ResultQueueClosed {
            host: host.hostname.clone(),
        })?;

    match hook_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn execute(
    ctx: &Context,
    logger: &dyn Logger,
    task: &dyn Task,
    host: &Arc<Host>,
) -> Result<TaskOutput, ArmadaError> {
    if let Some(err) = ctx.err() {
        return Err(err);
    }

    match AssertUnwindSafe(task.run(ctx, logger, host))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => Err(ArmadaError::TaskPanicked {
            task: task.display_name().to_string(),
            host: host.hostname.clone(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use crate::plugins::Processor;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Task for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        async fn run(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            host: &Arc<Host>,
        ) -> Result<TaskOutput, ArmadaError> {
            Ok(TaskOutput::new(host.hostname.clone()))
        }
    }

    struct Fails;

    #[async_trait]
    impl Task for Fails {
        fn name(&self) -> &str {
            "Fails"
        }

        async fn run(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            _host: &Arc<Host>,
        ) -> Result<TaskOutput, ArmadaError> {
            Err(ArmadaError::task("nope"))
        }
    }

    struct Panics;

    #[async_trait]
    impl Task for Panics {
        fn name(&self) -> &str {
            "Panics"
        }

        async fn run(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            _host: &Arc<Host>,
        ) -> Result<TaskOutput, ArmadaError> {
            panic!("kaboom");
        }
    }

    #[derive(Default)]
    struct Hooks {
        fail_start: bool,
        fail_complete: bool,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Processor for Hooks {
        async fn task_instance_started(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            host: &Arc<Host>,
            _task: &dyn Task,
        ) -> Result<(), ArmadaError> {
            self.seen.lock().push(format!("{}_started", host.hostname));
            if self.fail_start {
                return Err(ArmadaError::task("start hook"));
            }
            Ok(())
        }

        async fn task_instance_completed(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            result: &JobResult,
            host: &Arc<Host>,
            _task: &dyn Task,
        ) -> Result<(), ArmadaError> {
            self.seen.lock().push(format!(
                "{}_completed_err={}",
                host.hostname,
                result.err().is_some()
            ));
            if self.fail_complete {
                return Err(ArmadaError::task("complete hook"));
            }
            Ok(())
        }
    }

    fn processors(hooks: &Arc<Hooks>) -> Processors {
        let p: Arc<dyn Processor> = hooks.clone();
        Processors::from(vec![p])
    }

    #[tokio::test]
    async fn test_success_path() {
        let hooks = Arc::new(Hooks::default());
        let host = Arc::new(Host::new("dev1"));
        let (tx, mut rx) = mpsc::channel(1);

        task_wrapper(
            &Context::background(),
            &MemoryLogger::new(),
            &processors(&hooks),
            &Echo,
            &host,
            &tx,
        )
        .await
        .unwrap();

        let result = rx.recv().await.unwrap();
        assert_eq!(result.data_as::<String>().unwrap(), "dev1");
        assert!(host.err().is_none());
        assert_eq!(
            *hooks.seen.lock(),
            vec!["dev1_started", "dev1_completed_err=false"]
        );
    }

    #[tokio::test]
    async fn test_error_is_shared_with_host() {
        let host = Arc::new(Host::new("dev1"));
        let (tx, mut rx) = mpsc::channel(1);

        task_wrapper(
            &Context::background(),
            &MemoryLogger::new(),
            &Processors::new(),
            &Fails,
            &host,
            &tx,
        )
        .await
        .unwrap();

        let result = rx.recv().await.unwrap();
        let on_host = host.err().unwrap();
        assert!(Arc::ptr_eq(result.err().unwrap(), &on_host));
        assert_eq!(on_host.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_start_hook_failure_still_yields_result() {
        let hooks = Arc::new(Hooks {
            fail_start: true,
            ..Default::default()
        });
        let host = Arc::new(Host::new("dev1"));
        let (tx, mut rx) = mpsc::channel(1);

        let err = task_wrapper(
            &Context::background(),
            &MemoryLogger::new(),
            &processors(&hooks),
            &Echo,
            &host,
            &tx,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("TaskInstanceStarted"));

        let result = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(result.err().unwrap(), &err));
        assert!(result.data().is_none());
        assert!(matches!(
            **result.err().unwrap(),
            ArmadaError::Processor { .. }
        ));
        assert!(host.err().is_some());
        assert_eq!(
            *hooks.seen.lock(),
            vec!["dev1_started", "dev1_completed_err=true"]
        );
    }

    #[tokio::test]
    async fn test_complete_hook_failure_keeps_result() {
        let hooks = Arc::new(Hooks {
            fail_complete: true,
            ..Default::default()
        });
        let host = Arc::new(Host::new("dev1"));
        let logger = MemoryLogger::new();
        let (tx, mut rx) = mpsc::channel(1);

        let err = task_wrapper(
            &Context::background(),
            &logger,
            &processors(&hooks),
            &Echo,
            &host,
            &tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(*err, ArmadaError::Processor { .. }));
        let result = rx.recv().await.unwrap();
        assert!(result.err().is_none());
        assert_eq!(result.data_as::<String>().unwrap(), "dev1");
        assert_eq!(logger.messages("error").len(), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_result() {
        let host = Arc::new(Host::new("dev1"));
        let (tx, mut rx) = mpsc::channel(1);

        task_wrapper(
            &Context::background(),
            &MemoryLogger::new(),
            &Processors::new(),
            &Panics,
            &host,
            &tx,
        )
        .await
        .unwrap();

        let result = rx.recv().await.unwrap();
        match &**result.err().unwrap() {
            ArmadaError::TaskPanicked { task, message, .. } => {
                assert_eq!(task, "Panics");
                assert_eq!(message, "kaboom");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_done_context_skips_task() {
        let ctx = Context::background().with_timeout(Duration::ZERO);
        let host = Arc::new(Host::new("dev1"));
        let (tx, mut rx) = mpsc::channel(1);

        task_wrapper(&ctx, &MemoryLogger::new(), &Processors::new(), &Echo, &host, &tx)
            .await
            .unwrap();

        let result = rx.recv().await.unwrap();
        assert!(matches!(
            **result.err().unwrap(),
            ArmadaError::DeadlineExceeded
        ));
        assert!(result.data().is_none());
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let host = Arc::new(Host::new("dev1"));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = task_wrapper(
            &Context::background(),
            &MemoryLogger::new(),
            &Processors::new(),
            &Echo,
            &host,
            &tx,
        )
        .await
        .unwrap_err();
        assert!(matches!(*err, ArmadaError::ResultQueueClosed { .. }));
    }
}
