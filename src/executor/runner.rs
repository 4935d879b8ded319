// Runner: the scheduling strategy contract

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Context, JobResult, Task};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;
use crate::plugins::Processors;

/// Decides how a task is dispatched across hosts
///
/// Every host in `hosts` must end up with exactly one `JobResult` on
/// `results` once `wait` has returned. `run` may or may not block
/// depending on the strategy.
#[async_trait]
pub trait Runner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        ctx: &Context,
        logger: Arc<dyn Logger>,
        processors: &Processors,
        task: Arc<dyn Task>,
        hosts: &HashMap<String, Arc<Host>>,
        results: mpsc::Sender<JobResult>,
    ) -> Result<(), ArmadaError>;

    /// Block until every dispatched host has been handled
    async fn wait(&self) -> Result<(), ArmadaError>;

    /// Release whatever the runner still holds
    async fn close(&self) -> Result<(), ArmadaError>;
}
