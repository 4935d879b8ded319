// Built-in tasks

use crate::executor::Context;
use crate::output::errors::ArmadaError;

pub mod command;
pub mod func;
pub mod group;
pub mod local;
pub mod sftp;
pub mod ssh;

pub use command::RemoteCommand;
pub use func::FnTask;
pub use group::TaskGroup;
pub use local::LocalCommand;
pub use sftp::{SftpUpload, SftpUploadResult};
pub use ssh::{SshClose, SshOpen};

/// Run blocking transport work off the async workers, giving up when `ctx`
/// finishes first. The blocking call itself keeps running to completion.
pub(crate) async fn run_blocking<T, F>(ctx: &Context, f: F) -> Result<T, ArmadaError>
where
    F: FnOnce() -> Result<T, ArmadaError> + Send + 'static,
    T: Send + 'static,
{
    ctx.guard(async move {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| ArmadaError::Worker(e.to_string()))?
    })
    .await
}
