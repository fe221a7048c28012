//! The main execution context callbacks are delivered on.
//!
//! Network calls complete on worker tasks, but every caller-visible
//! callback is posted to a single [`MainContext`] so callbacks never run
//! concurrently with one another.

use tokio::sync::{mpsc, oneshot};

/// A unit of work posted to the main context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run callbacks one at a time, in posting order.
pub trait MainContext: Send + Sync {
    /// Queues `job`. Must not run it concurrently with other jobs.
    fn post(&self, job: Job);
}

/// A FIFO queue drained by one Tokio task.
///
/// # Examples
///
/// ```no_run
/// use stashline::context::{MainContext, SerialQueue};
///
/// # async fn example() -> Result<(), stashline::Error> {
/// let queue = SerialQueue::spawn()?;
/// queue.post(Box::new(|| println!("runs on the queue")));
/// queue.flush().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialQueue {
    /// Spawns the draining task on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when called outside a runtime.
    pub fn spawn() -> crate::Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            crate::Error::ConfigurationError(format!("No Tokio runtime for the main queue: {}", e))
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            tracing::debug!("Main queue closed");
        });
        Ok(Self { tx })
    }

    /// Waits until every job posted before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.await;
    }
}

impl MainContext for SerialQueue {
    fn post(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("Main queue is gone, dropping callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_jobs_run_in_order() {
        let queue = SerialQueue::spawn().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            queue.post(Box::new(move || seen.lock().unwrap().push(i)));
        }
        queue.flush().await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        assert!(matches!(
            SerialQueue::spawn(),
            Err(crate::Error::ConfigurationError(_))
        ));
    }
}
