//! Fixed-size worker pool for independent record processing tasks
//!
//! The pool is an ordinary owned value: build it from a [`PoolConfig`], hand
//! it to whatever needs parallel execution and drop it (or call
//! [`Pool::shutdown`]) when done. Workers pull tasks from one bounded queue;
//! [`Pool::submit`] blocks while the queue is full.
//!
//! ```rust
//! use mapbuf::config::PoolConfig;
//! use mapbuf::pool::Pool;
//!
//! # fn main() -> mapbuf::Result<()> {
//! let pool = Pool::new(&PoolConfig { thread_count: 2, max_queue_size: 8 })?;
//! let handle = pool.submit(|| 6 * 7)?;
//! assert_eq!(handle.wait()?, 42);
//! # Ok(())
//! # }
//! ```

use crate::config::PoolConfig;
use crate::core::error::{MapbufError, Result};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    /// Stops the worker that receives it
    Shutdown,
}

pub struct Pool {
    sender: Option<Sender<Message>>,
    workers: Vec<JoinHandle<()>>,
}

impl Pool {
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let hardware = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let num_threads = config.resolve_threads(hardware);
        let queue_size = config.resolve_queue_size();

        let (sender, receiver) = bounded(queue_size);
        let mut pool = Pool {
            sender: Some(sender),
            workers: Vec::with_capacity(num_threads),
        };

        for i in 0..num_threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("mapbuf-worker-{}", i))
                .spawn(move || worker_loop(receiver))?;
            pool.workers.push(handle);
        }

        info!(
            "Started worker pool: {} threads, queue size {}",
            num_threads, queue_size
        );
        Ok(pool)
    }

    /// Queue `task` and return a handle to its result
    ///
    /// Blocks while the queue is full.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(MapbufError::PoolShutdown)?;

        let (result_tx, result_rx) = bounded(1);
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(task)).map_err(panic_message);
            // The caller may have dropped its handle
            let _ = result_tx.send(outcome);
        });

        sender
            .send(Message::Run(job))
            .map_err(|_| MapbufError::PoolShutdown)?;
        Ok(TaskHandle { receiver: result_rx })
    }

    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Tasks waiting for a worker
    pub fn queue_size(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    pub fn queue_empty(&self) -> bool {
        self.queue_size() == 0
    }

    /// Let queued tasks finish, then stop and join every worker
    pub fn shutdown(&mut self) {
        let Some(sender) = self.sender.take() else {
            return;
        };

        debug!("Shutting down worker pool: {} threads", self.workers.len());
        for _ in 0..self.workers.len() {
            if sender.send(Message::Shutdown).is_err() {
                break;
            }
        }
        drop(sender);

        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                warn!("Worker {} exited abnormally", name);
            }
        }
        info!("Worker pool stopped");
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("num_threads", &self.num_threads())
            .field("queue_size", &self.queue_size())
            .finish()
    }
}

fn worker_loop(receiver: Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => job(),
            Message::Shutdown => break,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Result of a submitted task
#[derive(Debug)]
pub struct TaskHandle<R> {
    receiver: Receiver<std::result::Result<R, String>>,
}

impl<R> TaskHandle<R> {
    /// Block until the task has run
    ///
    /// A panicking task yields [`MapbufError::TaskFailed`].
    pub fn wait(self) -> Result<R> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(MapbufError::TaskFailed(message)),
            Err(_) => Err(MapbufError::TaskFailed(
                "task was dropped before it ran".into(),
            )),
        }
    }

    /// Whether the result is available without blocking
    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty()
    }
}
