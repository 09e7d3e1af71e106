pub mod errors;

use std::sync::LazyLock;

use tokio::runtime::{Builder, Runtime};

pub const DEFAULT_BUCKET: &str = "images";

pub const DEFAULT_QUEUE: &str = "images";

pub const DEFAULT_STAGING_DIR: &str = "./tmp/images";

/// Slot label of the untouched copy saved on upload.
pub const ORIGINAL_NAME: &str = "original";

pub const MAX_DELETE_ATTEMPTS: u64 = 5;

pub const MAX_OPEN_ATTEMPTS: usize = 3;

pub const OPEN_RETRY_DELAY_MS: u64 = 100;

pub static CURRENT_NUM_THREADS: LazyLock<usize> =
    LazyLock::new(|| std::thread::available_parallelism().map_or(1, |n| n.get()));

// Background worker runtime
// Transitions are blocking, so loops hand them to this runtime's blocking pool.
pub static WORKER_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("magpie-worker")
        .enable_all()
        .build()
        .expect("Failed to build worker Tokio runtime")
});
