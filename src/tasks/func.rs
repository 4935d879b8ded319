// Closure-backed tasks

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::executor::{Context, Task, TaskMetadata, TaskOutput};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

type TaskFn =
    dyn Fn(Context, Arc<Host>) -> BoxFuture<'static, Result<TaskOutput, ArmadaError>> + Send + Sync;

/// A task built from an async closure
///
/// ```no_run
/// use armada::prelude::*;
///
/// let hostname = FnTask::new("hostname", |_ctx, host| async move {
///     Ok(TaskOutput::new(host.hostname.clone()))
/// });
/// ```
pub struct FnTask {
    name: String,
    meta: Option<TaskMetadata>,
    f: Box<TaskFn>,
}

impl FnTask {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Context, Arc<Host>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, ArmadaError>> + Send + 'static,
    {
        FnTask {
            name: name.into(),
            meta: None,
            f: Box::new(
                move |ctx: Context, host: Arc<Host>| -> BoxFuture<'static, _> {
                    Box::pin(f(ctx, host))
                },
            ),
        }
    }

    pub fn with_metadata(mut self, identifier: impl Into<String>) -> Self {
        self.meta = Some(TaskMetadata::new(identifier));
        self
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("name", &self.name)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for FnTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> Option<&TaskMetadata> {
        self.meta.as_ref()
    }

    async fn run(
        &self,
        ctx: &Context,
        _logger: &dyn Logger,
        host: &Arc<Host>,
    ) -> Result<TaskOutput, ArmadaError> {
        (self.f)(ctx.clone(), host.clone()).await
    }
}
