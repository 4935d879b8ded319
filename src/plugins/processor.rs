// Processor chain: observers hooked into the run lifecycle

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::executor::{Context, JobResult, Task};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::{ArmadaError, HookPoint};

/// Hooks called around a run
///
/// `task_started` and `task_completed` fire once per run; the two instance
/// hooks fire once per host and may be called concurrently from different
/// workers, so implementations must synchronise their own state.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn task_started(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        Ok(())
    }

    async fn task_instance_started(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        _host: &Arc<Host>,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        Ok(())
    }

    async fn task_instance_completed(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        _result: &JobResult,
        _host: &Arc<Host>,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        Ok(())
    }

    async fn task_completed(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        Ok(())
    }
}

/// Ordered list of processors
///
/// Each hook calls the processors in registration order and stops at the
/// first failure, which is returned wrapped with the hook point.
#[derive(Clone, Default)]
pub struct Processors {
    processors: Vec<Arc<dyn Processor>>,
}

impl fmt::Debug for Processors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processors")
            .field("len", &self.processors.len())
            .finish()
    }
}

impl Processors {
    pub fn new() -> Self {
        Processors::default()
    }

    pub fn add(&mut self, processor: Arc<dyn Processor>) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub async fn task_started(
        &self,
        ctx: &Context,
        logger: &dyn Logger,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        for p in &self.processors {
            p.task_started(ctx, logger, task)
                .await
                .map_err(|e| wrap(HookPoint::TaskStarted, e))?;
        }
        Ok(())
    }

    pub async fn task_instance_started(
        &self,
        ctx: &Context,
        logger: &dyn Logger,
        host: &Arc<Host>,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        for p in &self.processors {
            p.task_instance_started(ctx, logger, host, task)
                .await
                .map_err(|e| wrap(HookPoint::TaskInstanceStarted, e))?;
        }
        Ok(())
    }

    pub async fn task_instance_completed(
        &self,
        ctx: &Context,
        logger: &dyn Logger,
        result: &JobResult,
        host: &Arc<Host>,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        for p in &self.processors {
            p.task_instance_completed(ctx, logger, result, host, task)
                .await
                .map_err(|e| wrap(HookPoint::TaskInstanceCompleted, e))?;
        }
        Ok(())
    }

    pub async fn task_completed(
        &self,
        ctx: &Context,
        logger: &dyn Logger,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        for p in &self.processors {
            p.task_completed(ctx, logger, task)
                .await
                .map_err(|e| wrap(HookPoint::TaskCompleted, e))?;
        }
        Ok(())
    }
}

impl From<Vec<Arc<dyn Processor>>> for Processors {
    fn from(processors: Vec<Arc<dyn Processor>>) -> Self {
        Processors { processors }
    }
}

impl FromIterator<Arc<dyn Processor>> for Processors {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Processor>>>(iter: I) -> Self {
        Processors {
            processors: iter.into_iter().collect(),
        }
    }
}

fn wrap(hook: HookPoint, source: ArmadaError) -> ArmadaError {
    ArmadaError::Processor {
        hook,
        source: Box::new(source),
    }
}
