//! Thread pool for background image loads.
//!
//! Uses work-stealing deques:
//! - New tasks go to a global injector
//! - Idle workers steal from each other
//!
//! Jobs can carry a load epoch. When an animator starts a new load cycle (or is
//! destroyed) it bumps its epoch, and queued jobs of the old cycle are skipped
//! instead of fetching images nobody will look at.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool shared by any number of animators.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4);
/// let epoch = Arc::new(AtomicU64::new(0));
///
/// workers.execute_with_epoch(&epoch, 0, move || {
///     let _ = tx.send(source.load(&url));
/// });
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Create pool with `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();

        let mut handles = Vec::with_capacity(num_threads);
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let spawned = thread::Builder::new()
                .name(format!("flipbook-loader-{}", worker_id))
                .spawn(move || {
                    trace!("Loader worker {} started", worker_id);
                    loop {
                        let job = local
                            .pop()
                            .or_else(|| injector.steal_batch_and_pop(&local).success())
                            .or_else(|| stealers.iter().find_map(|s| s.steal().success()));

                        if let Some(job) = job {
                            job();
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        // Idle: short sleep instead of spinning
                        thread::sleep(Duration::from_millis(1));
                    }
                    trace!("Loader worker {} stopped", worker_id);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::error!("Failed to spawn loader worker {}: {}", worker_id, e),
            }
        }

        trace!("Workers initialized: {} threads", handles.len());

        Self {
            injector,
            handles,
            shutdown,
        }
    }

    /// Pool sized for loading: 3/4 of the cores, at least one thread.
    pub fn with_default_threads() -> Self {
        Self::new((num_cpus::get() * 3 / 4).max(1))
    }

    pub fn num_threads(&self) -> usize {
        self.handles.len()
    }

    /// Run closure on a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.injector.push(Box::new(f));
    }

    /// Run closure only if `epoch` still holds `expected` when a worker picks it up.
    pub fn execute_with_epoch<F>(&self, epoch: &Arc<AtomicU64>, expected: u64, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let epoch = Arc::clone(epoch);
        self.execute(move || {
            if epoch.load(Ordering::Acquire) == expected {
                f();
            } else {
                trace!("Skipping stale job (epoch {} != {})", expected, epoch.load(Ordering::Relaxed));
            }
        });
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // A fetch can block for a while; don't hold the host hostage.
        let deadline = Instant::now() + Duration::from_millis(500);
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}
