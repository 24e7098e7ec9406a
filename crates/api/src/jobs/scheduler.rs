//! Interval-driven runner for the report background jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// How often a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    /// Run every N seconds.
    Seconds(u64),
    /// Run every N minutes.
    Minutes(u64),
    /// Run every hour.
    Hourly,
}

impl JobFrequency {
    /// Frequency for an interval given in seconds; whole hours and minutes
    /// are reported as such.
    pub fn from_secs(secs: u64) -> Self {
        match secs {
            3600 => JobFrequency::Hourly,
            s if s >= 60 && s % 60 == 0 => JobFrequency::Minutes(s / 60),
            s => JobFrequency::Seconds(s.max(1)),
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            JobFrequency::Seconds(secs) => Duration::from_secs(*secs),
            JobFrequency::Minutes(mins) => Duration::from_secs(*mins * 60),
            JobFrequency::Hourly => Duration::from_secs(3600),
        }
    }
}

/// A periodic background job.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn frequency(&self) -> JobFrequency;

    /// One execution. Errors are logged by the scheduler and never stop
    /// later executions.
    async fn execute(&self) -> Result<(), String>;
}

/// Runs each registered job on its own task until shutdown is signalled.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    /// Spawns one task per job. The first execution happens one interval
    /// after start; a slow execution delays, never stacks, later ticks.
    pub fn start(&mut self) {
        info!(jobs = ?self.job_names(), "Starting job scheduler");

        for job in &self.jobs {
            let job = Arc::clone(job);
            let mut shutdown_rx = self.shutdown_rx.clone();

            let handle = tokio::spawn(async move {
                let name = job.name();
                let frequency = job.frequency();
                let mut interval = tokio::time::interval(frequency.duration());
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval.tick().await;

                info!(job = name, frequency = ?frequency, "Job scheduled");

                loop {
                    tokio::select! {
                        _ = interval.tick() => run_once(job.as_ref()).await,
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                info!(job = name, "Job shutting down");
                                break;
                            }
                        }
                    }
                }
            });

            self.handles.push(handle);
        }
    }

    /// Signals every job task to stop after its current execution.
    pub fn shutdown(&self) {
        info!("Initiating job scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits for the job tasks, giving up after `timeout`.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        info!(timeout = ?timeout, "Waiting for jobs to complete");

        let all_done = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task panicked");
                }
            }
        };

        match tokio::time::timeout(timeout, all_done).await {
            Ok(()) => info!("All jobs completed gracefully"),
            Err(_) => warn!(timeout = ?timeout, "Job shutdown timed out"),
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes a job once, logging the outcome.
pub async fn run_once(job: &dyn Job) {
    let name = job.name();
    let start = Instant::now();
    debug!(job = name, "Job starting");

    match job.execute().await {
        Ok(()) => debug!(
            job = name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Job completed"
        ),
        Err(e) => error!(
            job = name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            error = %e,
            "Job failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &'static str {
            "counting_job"
        }

        fn frequency(&self) -> JobFrequency {
            JobFrequency::Seconds(1)
        }

        async fn execute(&self) -> Result<(), String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("source offline".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_frequency_from_secs() {
        assert_eq!(JobFrequency::from_secs(5), JobFrequency::Seconds(5));
        assert_eq!(JobFrequency::from_secs(60), JobFrequency::Minutes(1));
        assert_eq!(JobFrequency::from_secs(90), JobFrequency::Seconds(90));
        assert_eq!(JobFrequency::from_secs(3600), JobFrequency::Hourly);
        assert_eq!(JobFrequency::from_secs(0), JobFrequency::Seconds(1));
        assert_eq!(JobFrequency::Minutes(2).duration(), Duration::from_secs(120));
    }

    #[test]
    fn test_register() {
        let mut scheduler = JobScheduler::default();
        scheduler.register(CountingJob {
            runs: Arc::new(AtomicUsize::new(0)),
            fail: false,
        });
        assert_eq!(scheduler.job_names(), vec!["counting_job"]);
    }

    #[tokio::test]
    async fn test_run_once_swallows_failures() {
        let runs = Arc::new(AtomicUsize::new(0));
        let job = CountingJob {
            runs: Arc::clone(&runs),
            fail: true,
        };
        run_once(&job).await;
        run_once(&job).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = JobScheduler::new();
        scheduler.register(CountingJob {
            runs: Arc::clone(&runs),
            fail: false,
        });
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
