// Parallel runner: one worker per host

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use super::{task_wrapper, Context, JobResult, Runner, Task};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;
use crate::plugins::Processors;

/// Runs the task against every host at once
///
/// `run` spawns the workers and returns immediately; `wait` is the
/// completion barrier. Results arrive in completion order. An optional
/// limit caps how many hosts are in flight at the same time.
#[derive(Default)]
pub struct ParallelRunner {
    workers: Mutex<Vec<JoinHandle<()>>>,
    limit: Option<Arc<Semaphore>>,
}

impl ParallelRunner {
    pub fn new() -> Self {
        ParallelRunner::default()
    }

    /// Allow at most `max` hosts in flight; `0` means unbounded
    pub fn with_max_concurrency(max: usize) -> Self {
        ParallelRunner {
            workers: Mutex::new(Vec::new()),
            limit: (max > 0).then(|| Arc::new(Semaphore::new(max))),
        }
    }

    /// Workers spawned and not yet collected by `wait`
    pub fn pending(&self) -> usize {
        self.workers.lock().len()
    }
}

#[async_trait]
impl Runner for ParallelRunner {
    fn name(&self) -> &str {
        "Parallel"
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

        let mut workers = self.workers.lock();
        for (key, host) in hosts {
            let ctx = ctx.clone();
            let logger = logger.with_field("host", key);
            let processors = processors.clone();
            let task = task.clone();
            let host = host.clone();
            let results = results.clone();
            let limit = self.limit.clone();

            workers.push(tokio::spawn(async move {
                // Closed only if the runner is dropped mid-run; carry on unbounded then
                let _permit = match limit {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };

                logger.debug("starting");
                if let Err(e) = task_wrapper(
                    &ctx,
                    logger.as_ref(),
                    &processors,
                    task.as_ref(),
                    &host,
                    &results,
                )
                .await
                {
                    logger.error(&e.to_string());
                }
            }));
        }

        Ok(())
    }

    async fn wait(&self) -> Result<(), ArmadaError> {
        let workers = std::mem::take(&mut *self.workers.lock());

        let mut first_err = None;
        for joined in join_all(workers).await {
            if let Err(e) = joined {
                first_err.get_or_insert(ArmadaError::Worker(e.to_string()));
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), ArmadaError> {
        for worker in self.workers.lock().drain(..) {
            worker.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskOutput;
    use crate::logging::MemoryLogger;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct Sleep {
        dur: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Sleep {
        fn new(dur: Duration) -> Self {
            Sleep {
                dur,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Task for Sleep {
        fn name(&self) -> &str {
            "Sleep"
        }

        async fn run(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            host: &Arc<Host>,
        ) -> Result<TaskOutput, ArmadaError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.dur).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(TaskOutput::new(host.hostname.clone()))
        }
    }

    fn hosts(n: usize) -> HashMap<String, Arc<Host>> {
        (1..=n)
            .map(|i| {
                let name = format!("dev{}", i);
                (name.clone(), Arc::new(Host::new(name)))
            })
            .collect()
    }

    async fn drain(mut rx: mpsc::Receiver<JobResult>) -> Vec<JobResult> {
        let mut out = Vec::new();
        while let Some(r) = rx.recv().await {
            out.push(r);
        }
        out
    }

    #[tokio::test]
    async fn test_runs_hosts_concurrently() {
        let hosts = hosts(4);
        let task = Arc::new(Sleep::new(Duration::from_millis(200)));
        let runner = ParallelRunner::new();
        let (tx, rx) = mpsc::channel(hosts.len());

        let start = Instant::now();
        runner
            .run(
                &Context::background(),
                Arc::new(MemoryLogger::new()),
                &Processors::new(),
                task.clone(),
                &hosts,
                tx,
            )
            .await
            .unwrap();
        assert_eq!(runner.pending(), 4);
        runner.wait().await.unwrap();
        let elapsed = start.elapsed();

        let results = drain(rx).await;
        assert_eq!(results.len(), 4);
        assert!(elapsed < Duration::from_millis(600), "took {:?}", elapsed);
        assert_eq!(task.peak.load(Ordering::SeqCst), 4);
        assert_eq!(runner.pending(), 0);
    }

    #[tokio::test]
    async fn test_max_concurrency() {
        let hosts = hosts(6);
        let task = Arc::new(Sleep::new(Duration::from_millis(20)));
        let runner = ParallelRunner::with_max_concurrency(2);
        let (tx, rx) = mpsc::channel(hosts.len());

        runner
            .run(
                &Context::background(),
                Arc::new(MemoryLogger::new()),
                &Processors::new(),
                task.clone(),
                &hosts,
                tx,
            )
            .await
            .unwrap();
        runner.wait().await.unwrap();

        assert_eq!(drain(rx).await.len(), 6);
        assert!(task.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_hosts_warns() {
        let logger = MemoryLogger::new();
        let runner = ParallelRunner::new();
        let (tx, rx) = mpsc::channel(1);

        runner
            .run(
                &Context::background(),
                Arc::new(logger.clone()),
                &Processors::new(),
                Arc::new(Sleep::new(Duration::ZERO)),
                &HashMap::new(),
                tx,
            )
            .await
            .unwrap();
        runner.wait().await.unwrap();

        assert!(drain(rx).await.is_empty());
        assert_eq!(logger.messages("warn"), vec!["no hosts to run against"]);
    }

    #[tokio::test]
    async fn test_worker_logger_fields() {
        let logger = MemoryLogger::new();
        let runner = ParallelRunner::new();
        let (tx, rx) = mpsc::channel(1);

        runner
            .run(
                &Context::background(),
                Arc::new(logger.clone()),
                &Processors::new(),
                Arc::new(Sleep::new(Duration::ZERO)),
                &hosts(1),
                tx,
            )
            .await
            .unwrap();
        runner.wait().await.unwrap();
        drain(rx).await;

        let entry = &logger.entries()[0];
        assert_eq!(
            entry.fields,
            vec![
                ("runner".to_string(), "Parallel".to_string()),
                ("host".to_string(), "dev1".to_string()),
            ]
        );
    }
}
