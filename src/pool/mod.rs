//! Thread pool: bounded job queue, N workers, per-worker cleanup, crash-dump introspection.
//!
//! Generalizes the channel-driven worker loop the scan pipeline needs into an explicit,
//! reusable type so the same abstraction backs both the parse pool (N workers) and the
//! writer pool (exactly 1 worker).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded};

/// Per-worker debug snapshot, read by a crash handler or test harness without needing signals.
pub type DebugRegistry = Arc<Mutex<Vec<Option<String>>>>;

struct Inflight {
    count: AtomicUsize,
    idle: Condvar,
    mutex: Mutex<()>,
}

impl Inflight {
    fn new() -> Self {
        Inflight {
            count: AtomicUsize::new(0),
            idle: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.mutex.lock().unwrap();
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut guard = self.mutex.lock().unwrap();
        while self.count.load(Ordering::SeqCst) != 0 {
            guard = self.idle.wait(guard).unwrap();
        }
    }
}

/// A bounded FIFO job queue backed by `threads` worker OS threads.
///
/// `J` must be `Send + 'static`. Construct with [`ThreadPool::start`], `submit` jobs, then
/// `wait` for the queue to drain and `destroy` to join every worker.
pub struct ThreadPool<J> {
    sender: Option<Sender<J>>,
    workers: Vec<JoinHandle<()>>,
    inflight: Arc<Inflight>,
    debug: DebugRegistry,
}

impl<J: Send + 'static> ThreadPool<J> {
    /// Spawns `threads` workers, each running `job_fn(job)` for every job it receives in FIFO
    /// order. `describe_fn` renders a job for the debug registry before it runs; `cleanup_fn`,
    /// if given, runs once per worker at worker exit (used to release per-thread parser state).
    pub fn start<F, D, C>(threads: usize, capacity: usize, job_fn: F, describe_fn: D, cleanup_fn: Option<C>) -> ThreadPool<J>
    where
        F: Fn(J) + Send + Sync + 'static,
        D: Fn(&J) -> String + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let (tx, rx): (Sender<J>, Receiver<J>) = bounded(capacity);
        let job_fn = Arc::new(job_fn);
        let describe_fn = Arc::new(describe_fn);
        let cleanup_fn = cleanup_fn.map(Arc::new);
        let inflight = Arc::new(Inflight::new());
        let debug: DebugRegistry = Arc::new(Mutex::new(vec![None; threads.max(1)]));

        let mut workers = Vec::with_capacity(threads.max(1));
        for worker_id in 0..threads.max(1) {
            let rx = rx.clone();
            let job_fn = Arc::clone(&job_fn);
            let describe_fn = Arc::clone(&describe_fn);
            let cleanup_fn = cleanup_fn.clone();
            let inflight = Arc::clone(&inflight);
            let debug = Arc::clone(&debug);
            let handle = std::thread::Builder::new()
                .name(format!("pool-worker-{worker_id}"))
                .spawn(move || {
                    for job in rx.iter() {
                        {
                            let description = describe_fn(&job);
                            debug.lock().unwrap()[worker_id] = Some(description);
                        }
                        job_fn(job);
                        debug.lock().unwrap()[worker_id] = None;
                        inflight.leave();
                    }
                    if let Some(cleanup) = cleanup_fn {
                        cleanup();
                    }
                })
                .expect("failed to spawn pool worker thread");
            workers.push(handle);
        }

        ThreadPool {
            sender: Some(tx),
            workers,
            inflight,
            debug,
        }
    }

    /// Enqueues `job`. Blocks if the bounded queue is full. Panics if called after [`ThreadPool::close`].
    pub fn submit(&self, job: J) {
        self.inflight.enter();
        self.sender
            .as_ref()
            .expect("submit after pool close")
            .send(job)
            .expect("pool worker threads gone");
    }

    /// Blocks until the queue is empty and all workers are idle. Does not stop accepting work;
    /// callers that want to shut the pool down should call [`ThreadPool::close`] first.
    pub fn wait(&self) {
        self.inflight.wait_idle();
    }

    /// Stops accepting new jobs. Workers exit their loop once the queue drains.
    pub fn close(&mut self) {
        self.sender.take();
    }

    /// Waits for drain and joins every worker thread.
    pub fn destroy(mut self) {
        self.wait();
        self.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Snapshot of each worker's current job description, for crash-dump presentation.
    pub fn dump_debug_info(&self) -> Vec<Option<String>> {
        self.debug.lock().unwrap().clone()
    }

    pub fn debug_registry(&self) -> DebugRegistry {
        Arc::clone(&self.debug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[test]
    fn jobs_are_all_processed() {
        let counter = Arc::new(StdAtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let pool: ThreadPool<u32> = ThreadPool::start(
            4,
            16,
            move |_job: u32| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            },
            |job: &u32| format!("job-{job}"),
            None::<fn()>,
        );
        for i in 0..100u32 {
            pool.submit(i);
        }
        pool.destroy();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn wait_blocks_until_queue_drains() {
        let pool: ThreadPool<u32> = ThreadPool::start(
            1,
            16,
            |job: u32| {
                std::thread::sleep(std::time::Duration::from_millis(job as u64));
            },
            |job: &u32| format!("sleep-{job}"),
            None::<fn()>,
        );
        pool.submit(20);
        pool.submit(20);
        pool.wait();
        assert!(pool.dump_debug_info().iter().all(Option::is_none));
        pool.destroy();
    }

    #[test]
    fn single_worker_writer_pool_serializes() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = Arc::clone(&order);
        let pool: ThreadPool<u32> = ThreadPool::start(
            1,
            16,
            move |job: u32| {
                order_clone.lock().unwrap().push(job);
            },
            |job: &u32| format!("write-{job}"),
            None::<fn()>,
        );
        for i in 0..10u32 {
            pool.submit(i);
        }
        pool.destroy();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
