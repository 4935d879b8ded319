// Render processor: prints results as hosts complete

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use colored::Color;
use parking_lot::Mutex;

use super::Processor;
use crate::executor::{Context, JobResult, Task};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;
use crate::output::terminal::paint;

/// Writes `# <task>` when a run starts and one block per completed host
///
/// Writes are serialised so blocks from concurrent hosts never interleave.
pub struct RenderProcessor {
    wr: Mutex<Box<dyn Write + Send>>,
    color: bool,
}

impl RenderProcessor {
    pub fn new(wr: impl Write + Send + 'static, color: bool) -> Self {
        RenderProcessor {
            wr: Mutex::new(Box::new(wr)),
            color,
        }
    }

    /// Render to stdout
    pub fn stdout(color: bool) -> Self {
        Self::new(std::io::stdout(), color)
    }

    fn write(&self, text: &str) -> Result<(), ArmadaError> {
        let mut wr = self.wr.lock();
        wr.write_all(text.as_bytes())
            .and_then(|_| wr.flush())
            .map_err(|e| ArmadaError::Io {
                message: "problem rendering result".to_string(),
                path: None,
                source: e,
            })
    }
}

#[async_trait]
impl Processor for RenderProcessor {
    async fn task_started(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        let line = format!("# {}", task.display_name());
        self.write(&format!("{}\n", paint(&line, Color::Blue, self.color)))
    }

    async fn task_instance_completed(
        &self,
        _ctx: &Context,
        _logger: &dyn Logger,
        result: &JobResult,
        host: &Arc<Host>,
        _task: &dyn Task,
    ) -> Result<(), ArmadaError> {
        let header = format!("@ {}", host.hostname);

        let block = match result.err() {
            None => {
                let data = result.data().map(|d| d.to_string()).unwrap_or_default();
                format!("{}\n{}\n\n", paint(&header, Color::Green, self.color), data)
            }
            Some(err) => format!(
                "{}\n  - err: {}\n\n",
                paint(&header, Color::Red, self.color),
                err
            ),
        };

        self.write(&block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{TaskMetadata, TaskOutput};
    use crate::logging::NullLogger;

    /// Write sink the test can read back
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            console::strip_ansi_codes(&String::from_utf8_lossy(&self.0.lock())).to_string()
        }
    }

    struct Greet {
        meta: TaskMetadata,
    }

    #[async_trait]
    impl Task for Greet {
        fn name(&self) -> &str {
            "Greet"
        }

        fn metadata(&self) -> Option<&TaskMetadata> {
            Some(&self.meta)
        }

        async fn run(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            _host: &Arc<Host>,
        ) -> Result<TaskOutput, ArmadaError> {
            Ok(TaskOutput::empty())
        }
    }

    #[tokio::test]
    async fn test_render_blocks() {
        let buf = SharedBuf::default();
        let render = RenderProcessor::new(buf.clone(), true);
        let ctx = Context::background();
        let task = Greet {
            meta: TaskMetadata::new("say hello"),
        };

        render.task_started(&ctx, &NullLogger, &task).await.unwrap();

        let dev1 = Arc::new(Host::new("dev1"));
        let mut ok = JobResult::new(dev1.clone());
        ok.set_data("hello dev1".to_string());
        render
            .task_instance_completed(&ctx, &NullLogger, &ok, &dev1, &task)
            .await
            .unwrap();

        let dev2 = Arc::new(Host::new("dev2"));
        let failed = JobResult::new(dev2.clone()).with_err(Arc::new(ArmadaError::task("refused")));
        render
            .task_instance_completed(&ctx, &NullLogger, &failed, &dev2, &task)
            .await
            .unwrap();

        assert_eq!(
            buf.text(),
            "# say hello\n@ dev1\nhello dev1\n\n@ dev2\n  - err: refused\n\n"
        );
    }
}
