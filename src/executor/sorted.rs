// Sorted runner: deterministic, one host at a time

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{task_wrapper, Context, JobResult, Runner, Task};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;
use crate::plugins::Processors;

/// Runs hosts sequentially in ascending key order on the caller's task
///
/// `run` returns once every host is done, so `wait` has nothing to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct SortedRunner;

impl SortedRunner {
    pub fn new() -> Self {
        SortedRunner
    }
}

#[async_trait]
impl Runner for SortedRunner {
    fn name(&self) -> &str {
        "Sorted"
    }

    async fn run(
        &self,
        ctx: &Context,
        logger: Arc<dyn Logger>,
        processors: &Processors,
        task: Arc<dyn Task>,
        hosts: &HashMap<String, Arc<Host>>,
        results: mpsc::Sender<JobResult>,
    ) -> Result<(), ArmadaError> {
        let logger = logger.with_field("runner", &self.name());

        if hosts.is_empty() {
            logger.warn("no hosts to run against");
            return Ok(());
        }

        let mut keys: Vec<&String> = hosts.keys().collect();
        keys.sort();

        for key in keys {
            let host = &hosts[key];
            let logger = logger.with_field("host", key);

            logger.debug("starting");
            if let Err(e) = task_wrapper(
                ctx,
                logger.as_ref(),
                processors,
                task.as_ref(),
                host,
                &results,
            )
            .await
            {
                logger.error(&e.to_string());
                if matches!(*e, ArmadaError::ResultQueueClosed { .. }) {
                    return Err(Arc::try_unwrap(e)
                        .unwrap_or_else(|shared| ArmadaError::task(shared.to_string())));
                }
            }
        }

        Ok(())
    }

    async fn wait(&self) -> Result<(), ArmadaError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ArmadaError> {
        Ok(())
    }
}
