// Upload a file over the host's SSH session

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::run_blocking;
use crate::executor::ssh::SSH_CONNECTION;
use crate::executor::{Context, SshConnection, Task, TaskMetadata, TaskOutput};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

/// Copy `src` on the controller to `dst` on the host; needs a prior `SshOpen`
#[derive(Debug, Clone)]
pub struct SftpUpload {
    pub src: PathBuf,
    pub dst: String,
    pub meta: Option<TaskMetadata>,
}

impl SftpUpload {
    pub fn new(src: impl Into<PathBuf>, dst: impl Into<String>) -> Self {
        SftpUpload {
            src: src.into(),
            dst: dst.into(),
            meta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SftpUploadResult {
    pub dst: String,
    pub bytes: u64,
}

impl fmt::Display for SftpUploadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " * uploaded {} bytes to {}", self.bytes, self.dst)
    }
}

#[async_trait]
impl Task for SftpUpload {
    fn name(&self) -> &str {
        "SftpUpload"
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
        let conn = host.connection_as::<SshConnection>(SSH_CONNECTION)?;

        logger.debug(&format!("uploading {} to {}", self.src.display(), self.dst));
        let src = self.src.clone();
        let dst = self.dst.clone();
        let bytes = run_blocking(ctx, move || conn.upload_file(&src, &dst)).await?;

        Ok(TaskOutput::new(SftpUploadResult {
            dst: self.dst.clone(),
            bytes,
        })
        .changed(true))
    }
}
