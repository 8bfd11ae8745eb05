//! Bounded worker pool for blocking pipeline stages
//!
//! Stage bodies (tag I/O, format conversion, key estimation, metadata
//! lookups) are blocking calls. Each submitted job runs on tokio's blocking
//! thread pool, but at most `size` jobs run at once, gated by a semaphore
//! sized to the number of CPU cores by default.
//!
//! Jobs return nothing to the submitter. A job that returns an error or
//! panics is a stage fault: it is logged and delivered to the [`FaultSink`],
//! whose receiver decides to terminate the service. Faults are never
//! swallowed, since a failed stage leaves its processing entry stuck.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// A failed worker job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFault {
    /// Label the job was submitted with
    pub label: String,
    pub message: String,
}

impl fmt::Display for StageFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.message)
    }
}

/// Single destination for stage faults
#[derive(Debug, Clone)]
pub struct FaultSink {
    tx: mpsc::UnboundedSender<StageFault>,
}

#[derive(Debug)]
pub struct FaultReceiver {
    rx: mpsc::UnboundedReceiver<StageFault>,
}

pub fn fault_channel() -> (FaultSink, FaultReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FaultSink { tx }, FaultReceiver { rx })
}

impl FaultSink {
    pub fn report(&self, label: &str, message: impl Into<String>) {
        let fault = StageFault {
            label: label.to_string(),
            message: message.into(),
        };
        error!(job = %fault.label, "Stage failed: {}", fault.message);
        // Receiver gone means the service is already shutting down
        let _ = self.tx.send(fault);
    }
}

impl FaultReceiver {
    /// Wait for the next fault
    pub async fn recv(&mut self) -> Option<StageFault> {
        self.rx.recv().await
    }

    /// Next fault if one is already queued
    pub fn try_recv(&mut self) -> Option<StageFault> {
        self.rx.try_recv().ok()
    }
}

/// Bounded executor for blocking stage bodies
///
/// Cloning yields another handle to the same pool. Jobs may submit further
/// jobs from inside their body.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    faults: FaultSink,
    stage_timeout: Option<Duration>,
    size: usize,
}

impl WorkerPool {
    /// Create a pool running at most `size` jobs at once
    ///
    /// Must be called from within a tokio runtime. `stage_timeout` only
    /// reports overruns as faults; the overrunning job keeps its slot until
    /// it returns.
    pub fn new(size: usize, faults: FaultSink, stage_timeout: Option<Duration>) -> Self {
        let size = size.max(1);
        Self {
            handle: Handle::current(),
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            faults,
            stage_timeout,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs submitted and not yet finished, including queued ones
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Schedule `job`; failures go to the fault sink under `label`
    pub fn submit<F>(&self, label: impl Into<String>, job: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let label = label.into();
        let permits = Arc::clone(&self.permits);
        let faults = self.faults.clone();
        let stage_timeout = self.stage_timeout;

        self.tracker.spawn_on(
            async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        faults.report(&label, "worker pool closed before job started");
                        return;
                    }
                };

                debug!(job = %label, "Job started");
                let mut task = tokio::task::spawn_blocking(job);
                let outcome = match stage_timeout {
                    Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            faults.report(
                                &label,
                                format!("stage exceeded timeout of {}ms", limit.as_millis()),
                            );
                            task.await
                        }
                    },
                    None => task.await,
                };

                match outcome {
                    Ok(Ok(())) => debug!(job = %label, "Job finished"),
                    Ok(Err(e)) => faults.report(&label, format!("{:#}", e)),
                    Err(join_err) if join_err.is_panic() => {
                        faults.report(&label, panic_message(join_err.into_panic()))
                    }
                    Err(join_err) => faults.report(&label, join_err.to_string()),
                }
            },
            &self.handle,
        );
    }

    /// Wait until every submitted job, including ones submitted by running
    /// jobs, has finished
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait for every in-flight job to run to completion
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
