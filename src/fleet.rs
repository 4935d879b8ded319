// Fleet: inventory + runner + processors + logger, wired into a run

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::executor::{Context, JobResult, ParallelRunner, Runner, Task};
use crate::inventory::filter::FilterFunc;
use crate::inventory::{Inventory, InventoryPlugin};
use crate::logging::{Logger, TracingLogger};
use crate::output::errors::{ArmadaError, RunStage};
use crate::plugins::{Processor, Processors};

/// The orchestrator
///
/// A `Fleet` is cheap to clone and every `with_*` call returns a new value,
/// so a base fleet can be specialised per run without affecting others:
///
/// ```no_run
/// use std::sync::Arc;
/// use armada::prelude::*;
///
/// # async fn demo(inventory: Inventory) -> Result<(), ArmadaError> {
/// let fleet = Fleet::new().with_inventory(inventory);
/// let junos = fleet.filter(&filter::with_platform("junos"));
///
/// let task = Arc::new(FnTask::new("hostname", |_ctx, host| async move {
///     Ok(TaskOutput::new(host.hostname.clone()))
/// }));
/// let mut results = junos.run_sync(&Context::background(), task).await?;
/// while let Some(result) = results.recv().await {
///     println!("{}: {:?}", result.host().hostname, result.err());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Fleet {
    inventory: Arc<Inventory>,
    logger: Arc<dyn Logger>,
    runner: Arc<dyn Runner>,
    processors: Processors,
}

impl Default for Fleet {
    fn default() -> Self {
        Fleet::new()
    }
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("hosts", &self.inventory.host_count())
            .field("runner", &self.runner.name())
            .field("processors", &self.processors)
            .finish()
    }
}

impl Fleet {
    /// Empty inventory, tracing logger, parallel runner, no processors
    pub fn new() -> Self {
        Fleet {
            inventory: Arc::new(Inventory::new()),
            logger: Arc::new(TracingLogger::new()),
            runner: Arc::new(ParallelRunner::new()),
            processors: Processors::new(),
        }
    }

    pub fn with_inventory(&self, inventory: Inventory) -> Self {
        Fleet {
            inventory: Arc::new(inventory),
            ..self.clone()
        }
    }

    /// Populate the inventory from a plugin
    pub fn with_inventory_plugin(&self, plugin: &dyn InventoryPlugin) -> Result<Self, ArmadaError> {
        Ok(self.with_inventory(plugin.create()?))
    }

    pub fn with_logger(&self, logger: Arc<dyn Logger>) -> Self {
        Fleet {
            logger,
            ..self.clone()
        }
    }

    pub fn with_runner(&self, runner: Arc<dyn Runner>) -> Self {
        Fleet {
            runner,
            ..self.clone()
        }
    }

    /// Replace the processor chain
    pub fn with_processors(&self, processors: Processors) -> Self {
        Fleet {
            processors,
            ..self.clone()
        }
    }

    /// Append one processor to the chain
    pub fn with_processor(&self, processor: Arc<dyn Processor>) -> Self {
        let mut processors = self.processors.clone();
        processors.add(processor);
        self.with_processors(processors)
    }

    /// New fleet whose inventory only holds the hosts `f` accepts
    pub fn filter(&self, f: &FilterFunc) -> Self {
        Fleet {
            inventory: Arc::new(self.inventory.filter(f)),
            ..self.clone()
        }
    }

    /// New fleet whose inventory only holds the listed inventory keys
    pub fn limit<S: AsRef<str>>(&self, keys: &[S]) -> Self {
        Fleet {
            inventory: Arc::new(self.inventory.select_keys(keys)),
            ..self.clone()
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.runner
    }

    pub fn processors(&self) -> &Processors {
        &self.processors
    }

    fn run_logger(&self, task: &dyn Task) -> Arc<dyn Logger> {
        self.logger
            .with_field("run_id", &Uuid::new_v4())
            .with_field("task", &task.display_name())
    }

    /// Run `task` against every host and wait for all of them
    ///
    /// The returned receiver already holds one result per host and is closed.
    pub async fn run_sync(
        &self,
        ctx: &Context,
        task: Arc<dyn Task>,
    ) -> Result<mpsc::Receiver<JobResult>, ArmadaError> {
        let (tx, rx) = mpsc::channel(self.inventory.host_count().max(1));
        let logger = self.run_logger(task.as_ref());

        self.processors
            .task_started(ctx, logger.as_ref(), task.as_ref())
            .await
            .map_err(|e| e.at_stage(RunStage::TaskStarted))?;

        self.runner
            .run(
                ctx,
                logger.clone(),
                &self.processors,
                task.clone(),
                &self.inventory.hosts,
                tx,
            )
            .await
            .map_err(|e| e.at_stage(RunStage::Dispatch))?;

        self.runner
            .wait()
            .await
            .map_err(|e| e.at_stage(RunStage::Wait))?;

        self.processors
            .task_completed(ctx, logger.as_ref(), task.as_ref())
            .await
            .map_err(|e| e.at_stage(RunStage::TaskCompleted))?;

        Ok(rx)
    }

    /// Dispatch `task` without waiting
    ///
    /// Results go to `results`; the channel closes once every worker has
    /// dropped its sender. Pass the returned [`AsyncRun`] to [`Fleet::finish`]
    /// to wait for the runner and fire the `task_completed` hooks.
    pub async fn run_async(
        &self,
        ctx: &Context,
        task: Arc<dyn Task>,
        results: mpsc::Sender<JobResult>,
    ) -> Result<AsyncRun, ArmadaError> {
        let logger = self.run_logger(task.as_ref());

        self.processors
            .task_started(ctx, logger.as_ref(), task.as_ref())
            .await
            .map_err(|e| e.at_stage(RunStage::TaskStarted))?;

        self.runner
            .run(
                ctx,
                logger.clone(),
                &self.processors,
                task.clone(),
                &self.inventory.hosts,
                results,
            )
            .await
            .map_err(|e| e.at_stage(RunStage::Dispatch))?;

        Ok(AsyncRun { task, logger })
    }

    /// Wait for a `run_async` dispatch and run the `task_completed` hooks
    pub async fn finish(&self, ctx: &Context, run: AsyncRun) -> Result<(), ArmadaError> {
        self.runner
            .wait()
            .await
            .map_err(|e| e.at_stage(RunStage::Wait))?;

        self.processors
            .task_completed(ctx, run.logger.as_ref(), run.task.as_ref())
            .await
            .map_err(|e| e.at_stage(RunStage::TaskCompleted))
    }
}

/// A dispatched `run_async` run, carrying its task and run-scoped logger
pub struct AsyncRun {
    task: Arc<dyn Task>,
    logger: Arc<dyn Logger>,
}

impl AsyncRun {
    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    /// Logger carrying the run's `run_id` and `task` fields
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }
}
