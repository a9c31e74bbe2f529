//! Background job scheduler.
//!
//! DESIGN
//! ======
//! Provisioning calls run outside the request/response cycle: the HTTP
//! handler submits a unit of work and returns immediately, and the job
//! publishes its outcome through persisted state and the broadcast
//! router. Submission is explicit and returns a handle instead of
//! unstructured detached spawning, so callers (and tests) can await or
//! abort a job.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::info;

/// Submits fire-and-forget work onto the runtime.
#[derive(Clone, Copy, Default)]
pub struct JobScheduler;

impl JobScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Submit a job. The caller never awaits the result through the
    /// handle on the request path; completion is observable only via
    /// persisted state and broadcasts.
    pub fn submit<F>(&self, name: &'static str, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(job = name, "submitting background job");
        tokio::spawn(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitted_job_runs_to_completion() {
        let scheduler = JobScheduler::new();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = scheduler.submit("test-job", async move {
            let _ = tx.send(42);
        });

        assert_eq!(rx.await.unwrap(), 42);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn handle_supports_abort() {
        let scheduler = JobScheduler::new();
        let handle = scheduler.submit("never-finishes", async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
