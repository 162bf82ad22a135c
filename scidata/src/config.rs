//! Process wide configuration.
//!
//! The only setting is the [`Parallelism`] hint used by element-wise loops. It is read lazily from
//! the `SCIDATA_NUM_THREADS` environment variable and can be overridden with
//! [`set_parallelism`]. Parallel loops run on a dedicated rayon pool with that many threads, or on
//! the global rayon pool when the count is `0`.

use std::{
    env,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Environment variable holding the thread count hint. `0` or unset uses all rayon threads.
pub const THREADS_ENV: &str = "SCIDATA_NUM_THREADS";

/// Loops with fewer elements per thread than this run sequentially.
pub const MIN_ITEMS_PER_THREAD: usize = 1 << 14;

const UNSET: usize = usize::MAX;

static THREADS: AtomicUsize = AtomicUsize::new(UNSET);

/// Dedicated pool and the thread count it was built for.
static POOL: Mutex<Option<(usize, Arc<ThreadPool>)>> = parking_lot::const_mutex(None);

/// Parallelism strategy for element-wise loops.
///
/// This is a hint. Loops downgrade to sequential execution when the workload is too small to
/// benefit from spawning work on the rayon pool.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    /// Strictly sequential execution
    #[default]
    Sequential,

    /// Parallel execution with up to `n` threads. `n <= 1` is equivalent to `Sequential`.
    Parallel(usize),
}

impl Parallelism {
    /// Create a parallelism hint from a thread count.
    ///
    /// `0` uses rayon's current thread count, `1` is sequential.
    ///
    pub fn from_threads(n_threads: usize) -> Self {
        match n_threads {
            0 => Self::Parallel(rayon::current_num_threads()),
            1 => Self::Sequential,
            n => Self::Parallel(n),
        }
    }

    pub fn allows_parallel(self) -> bool {
        matches!(self, Self::Parallel(n) if n > 1)
    }

    pub fn n_threads(self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Parallel(n) => n.max(1),
        }
    }

    /// Downgrade to sequential if `n_items` is too small to keep more than one thread busy.
    pub fn correct_for_workload(self, n_items: usize, min_items_per_thread: usize) -> Self {
        match self {
            Self::Sequential => Self::Sequential,
            Self::Parallel(n) => {
                let effective_threads = n.min(n_items / min_items_per_thread.max(1)).max(1);
                if effective_threads <= 1 {
                    Self::Sequential
                } else {
                    Self::Parallel(effective_threads)
                }
            }
        }
    }
}

/// Override the process wide parallelism hint.
pub fn set_parallelism(parallelism: Parallelism) {
    let threads = match parallelism {
        Parallelism::Sequential => 1,
        Parallelism::Parallel(n) => n.max(1),
    };
    THREADS.store(threads, Ordering::Relaxed);
}

/// The process wide parallelism hint.
pub fn parallelism() -> Parallelism {
    Parallelism::from_threads(threads())
}

/// Parallelism to use for a loop over `n_items` elements.
pub(crate) fn for_workload(n_items: usize) -> Parallelism {
    parallelism().correct_for_workload(n_items, MIN_ITEMS_PER_THREAD)
}

/// Run `op` on the pool matching the process wide thread count.
///
/// Parallel iterators started inside `op` use at most that many threads. With a count of `0` or
/// `1` no dedicated pool is built and `op` runs on the caller's pool.
///
pub(crate) fn install<R, F>(op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    match pool(threads()) {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

fn threads() -> usize {
    let mut threads = THREADS.load(Ordering::Relaxed);
    if threads == UNSET {
        threads = threads_from_env();
        THREADS.store(threads, Ordering::Relaxed);
    }

    threads
}

fn pool(threads: usize) -> Option<Arc<ThreadPool>> {
    if threads <= 1 {
        return None;
    }

    let mut cached = POOL.lock();
    if let Some((n, pool)) = cached.as_ref() {
        if *n == threads {
            return Some(Arc::clone(pool));
        }
    }
    match ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("scidata-{i}"))
        .build()
    {
        Ok(pool) => {
            log::debug!("built thread pool with {threads} threads");
            let pool = Arc::new(pool);
            *cached = Some((threads, Arc::clone(&pool)));
            Some(pool)
        }
        Err(err) => {
            log::warn!("Cannot build a pool with {threads} threads, using the global pool: {err}");
            None
        }
    }
}

fn threads_from_env() -> usize {
    match env::var(THREADS_ENV) {
        Ok(value) => match value.trim().parse() {
            Ok(threads) => threads,
            Err(_) => {
                log::warn!("Ignoring {THREADS_ENV}={value:?}, expected a thread count");
                0
            }
        },
        Err(_) => 0,
    }
}
