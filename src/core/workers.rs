//! Bounded worker pool for thumbnail, audio-peak and proxy tasks.
//!
//! - Tasks go through a bounded queue; `submit` blocks when it is full,
//!   `try_submit` gives up instead
//! - Each task gets a [`CancelToken`] and must poll it between frames
//! - `abort_all()` bumps the pool epoch: queued tasks from an older epoch are
//!   skipped and running ones see their token cancelled
//!
//! The timeline never waits on a task. Results come back as events.

use crossbeam_channel::{bounded, Sender, TrySendError};
use log::{error, trace};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared abort flag checked by a running task.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct Workers {
    sender: Option<Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    epoch: Arc<AtomicU64>,
    /// Tokens of tasks not yet finished, cancelled by abort_all()
    live: Arc<Mutex<Vec<CancelToken>>>,
}

impl Workers {
    /// Spawn `num_threads` workers (0 = three quarters of the cores) behind a
    /// queue of `queue_depth` tasks.
    pub fn new(num_threads: usize, queue_depth: usize) -> Self {
        let num_threads = if num_threads == 0 {
            (num_cpus::get() * 3 / 4).max(1)
        } else {
            num_threads
        };
        let (sender, receiver) = bounded::<Job>(queue_depth.max(1));

        let mut handles = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let receiver = receiver.clone();
            let spawned = thread::Builder::new()
                .name(format!("montage-worker-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    // ends when every sender is dropped
                    for job in receiver.iter() {
                        job();
                    }
                    trace!("Worker {} stopped", worker_id);
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => error!("Failed to spawn worker {}: {}", worker_id, e),
            }
        }
        trace!("Workers initialized: {} threads, queue depth {}", handles.len(), queue_depth);

        Self {
            sender: Some(sender),
            handles,
            epoch: Arc::new(AtomicU64::new(0)),
            live: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    pub fn thread_count(&self) -> usize {
        self.handles.len()
    }

    /// Queue a task, blocking while the queue is full.
    pub fn submit<F>(&self, task: F) -> Option<CancelToken>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let (token, job) = self.wrap(task);
        let sender = self.sender.as_ref()?;
        sender.send(job).ok()?;
        Some(token)
    }

    /// Queue a task unless the queue is full.
    pub fn try_submit<F>(&self, task: F) -> Option<CancelToken>
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let (token, job) = self.wrap(task);
        match self.sender.as_ref()?.try_send(job) {
            Ok(()) => Some(token),
            Err(TrySendError::Full(_)) => {
                trace!("Task queue full, request dropped");
                None
            }
            Err(TrySendError::Disconnected(_)) => None,
        }
    }

    /// Cancel every queued and running task.
    pub fn abort_all(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        for token in live.drain(..) {
            token.cancel();
        }
    }

    fn wrap<F>(&self, task: F) -> (CancelToken, Job)
    where
        F: FnOnce(&CancelToken) + Send + 'static,
    {
        let token = CancelToken::new();
        let epoch_at_submit = self.current_epoch();
        let epoch = Arc::clone(&self.epoch);
        let live = Arc::clone(&self.live);
        {
            let mut tokens = live.lock().unwrap_or_else(|e| e.into_inner());
            tokens.retain(|t| !t.is_cancelled() && Arc::strong_count(&t.0) > 1);
            tokens.push(token.clone());
        }

        let task_token = token.clone();
        let job: Job = Box::new(move || {
            // stale: the pool was aborted after this task was queued
            if epoch.load(Ordering::Relaxed) != epoch_at_submit || task_token.is_cancelled() {
                return;
            }
            task(&task_token);
        });
        (token, job)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);
        self.abort_all();
        self.sender = None;

        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, exiting anyway");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
        trace!("All {} workers stopped", num_threads);
    }
}
