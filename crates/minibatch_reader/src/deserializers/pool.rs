//! Worker pool for decoding the records of one minibatch in parallel.
//!
//! Workers pull tasks from one shared bounded queue and push results to a
//! bounded output queue. Results arrive in completion order; callers tag
//! tasks with their position to restore request order.

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    pub(crate) fn new<F>(num_workers: usize, buffer_size: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        if num_workers == 0 {
            bail!("Cannot create WorkerPool with 0 workers; decode inline instead");
        }
        if buffer_size == 0 {
            bail!("Cannot create WorkerPool with buffer_size 0");
        }

        let (task_tx, task_rx) = bounded(buffer_size);
        let (output_tx, output_rx) = bounded(buffer_size);
        let shutdown = Arc::new(AtomicBool::new(false));
        let worker_fn = Arc::new(worker_fn);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown_clone = shutdown.clone();
            let worker_fn_clone = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("decode-worker-{}", worker_id))
                .spawn(move || worker_fn_clone(task_rx, output_tx, shutdown_clone))
                .with_context(|| format!("Failed to spawn worker thread {}", worker_id))?;
            workers.push(handle);
        }

        Ok(Self {
            workers,
            task_tx: Some(task_tx),
            output_rx,
            shutdown,
        })
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Submits every task and waits for one output per task.
    ///
    /// Outputs are drained while the task queue is full, so the bounded
    /// queues cannot block each other.
    pub(crate) fn run(&self, tasks: Vec<Task>) -> Result<Vec<Output>> {
        let task_tx = self
            .task_tx
            .as_ref()
            .ok_or_else(|| anyhow!("Worker pool is shut down"))?;
        let expected = tasks.len();
        let mut outputs = Vec::with_capacity(expected);

        for task in tasks {
            let mut pending = task;
            loop {
                match task_tx.try_send(pending) {
                    Ok(()) => break,
                    Err(TrySendError::Full(task)) => {
                        pending = task;
                        outputs.push(self.recv()?);
                    }
                    Err(TrySendError::Disconnected(_)) => bail!("All decode workers exited"),
                }
            }
        }
        while outputs.len() < expected {
            outputs.push(self.recv()?);
        }
        Ok(outputs)
    }

    fn recv(&self) -> Result<Output> {
        self.output_rx
            .recv()
            .map_err(|_| anyhow!("All decode workers exited before finishing"))
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // Closing the task queue wakes workers blocked in recv()
        self.task_tx.take();

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Standard worker loop: apply `f` to each task until shutdown or until the
/// task queue closes.
pub(crate) fn serve<Task, Output>(
    task_rx: Receiver<Task>,
    output_tx: Sender<Output>,
    shutdown: Arc<AtomicBool>,
    f: impl Fn(Task) -> Output,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let Ok(task) = task_rx.recv() else {
            break;
        };
        if output_tx.send(f(task)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squaring_pool(workers: usize, buffer: usize) -> Result<WorkerPool<u64, (u64, u64)>> {
        WorkerPool::new(workers, buffer, |rx, tx, shutdown| {
            serve(rx, tx, shutdown, |n: u64| (n, n * n))
        })
    }

    #[test]
    fn test_every_task_gets_an_output() -> Result<()> {
        let pool = squaring_pool(3, 2)?;
        assert_eq!(pool.num_workers(), 3);

        // more tasks than both queues hold together
        let mut outputs = pool.run((0..50).collect())?;
        outputs.sort();
        assert_eq!(outputs.len(), 50);
        assert!(outputs.iter().all(|(n, sq)| n * n == *sq));

        // the pool is reusable across calls
        assert_eq!(pool.run(vec![7])?, vec![(7, 49)]);
        assert!(pool.run(Vec::new())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_rejects_degenerate_sizes() {
        assert!(squaring_pool(0, 4).is_err());
        assert!(squaring_pool(2, 0).is_err());
    }

    #[test]
    fn test_drop_joins_workers() -> Result<()> {
        let pool = squaring_pool(4, 1)?;
        pool.run(vec![1, 2, 3])?;
        drop(pool);
        Ok(())
    }
}
