//! Bounded worker pool used once per pipeline stage
//!
//! A pool is consumed by [`WorkerPool::run`]: one batch goes in, every input
//! produces exactly one [`TaskResult`], and the results come back in the order
//! the workers finished them. Task errors and panics are recorded per input and
//! never stop the other workers.

use crate::error::{ConfigError, TaskError};
use futures::future::{self, FutureExt};
use log::{debug, warn};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

type JobQueue<I> = Arc<Mutex<mpsc::UnboundedReceiver<(usize, I)>>>;

/// Outcome of one task, tagged with the position of its input in the batch
#[derive(Debug)]
pub struct TaskResult<T> {
    /// Submission index of the input that produced this result
    pub index: usize,
    pub result: Result<T, TaskError>,
}

impl<T> TaskResult<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    /// Drop the error, keeping only a successful value
    pub fn ok(self) -> Option<T> {
        self.result.ok()
    }
}

/// Fixed-concurrency executor for a single batch
pub struct WorkerPool<F> {
    concurrency: usize,
    task: Arc<F>,
}

impl<F> WorkerPool<F> {
    /// Create a pool running `task` on at most `concurrency` inputs at once
    pub fn new(concurrency: usize, task: F) -> Result<Self, ConfigError> {
        if concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }

        Ok(Self {
            concurrency,
            task: Arc::new(task),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every input through the task and wait for all of them.
    ///
    /// Exactly `concurrency` workers are spawned; each pulls the next input
    /// from a shared queue until the queue is drained.
    pub async fn run<I, O, Fut>(self, inputs: Vec<I>) -> Vec<TaskResult<O>>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        I: Send + 'static,
        O: Send + 'static,
    {
        let total = inputs.len();
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        for job in inputs.into_iter().enumerate() {
            // job_rx is held below, so the send cannot fail
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let queue: JobQueue<I> = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        let workers: Vec<_> = (0..self.concurrency)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&self.task),
                    result_tx.clone(),
                ))
            })
            .collect();
        drop(result_tx);

        for joined in future::join_all(workers).await {
            if let Err(e) = joined {
                warn!("worker exited abnormally: {}", e);
            }
        }

        let mut results = Vec::with_capacity(total);
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }

        if results.len() != total {
            warn!(
                "stage collected {} results for {} inputs",
                results.len(),
                total
            );
        }

        results
    }
}

/// Build a pool and run one batch through it
pub async fn run_stage<I, O, F, Fut>(
    inputs: Vec<I>,
    concurrency: usize,
    task: F,
) -> Result<Vec<TaskResult<O>>, ConfigError>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    let pool = WorkerPool::new(concurrency, task)?;
    Ok(pool.run(inputs).await)
}

async fn worker<I, O, F, Fut>(
    id: usize,
    queue: JobQueue<I>,
    task: Arc<F>,
    results: mpsc::UnboundedSender<TaskResult<O>>,
) where
    F: Fn(I) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<O>> + Send,
{
    let mut handled = 0usize;

    loop {
        let job = queue.lock().await.recv().await;
        let Some((index, input)) = job else {
            break;
        };

        let outcome = AssertUnwindSafe(async { (*task)(input).await })
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TaskError::Failed(e)),
            Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
        };

        handled += 1;
        if results.send(TaskResult { index, result }).is_err() {
            break;
        }
    }

    debug!("worker {} finished after {} tasks", id, handled);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
