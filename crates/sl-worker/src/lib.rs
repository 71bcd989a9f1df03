//! Worker tier: claim → load context → match → dispatch → record.
//!
//! N worker processes (each running one or more loops) compete for jobs via
//! the queue's atomic claim; within a loop, processing is sequential. A bad
//! job never kills the loop; failures are recorded on the job and the loop
//! continues.

pub mod context;
pub mod process;
pub mod recovery;

pub use context::WorkerContext;
pub use process::{process_job, run_worker};
pub use recovery::{spawn_progress_loop, spawn_recovery_loop};

/// Consecutive failed deliveries within the window that flip a stream to
/// `failed`.
pub const MAX_CONSECUTIVE_FAILURES: i64 = 10;
/// Window (minutes) over which consecutive failures are counted.
pub const FAILURE_WINDOW_MINUTES: i64 = 60;
/// Job-level attempt ceiling (retryable failures re-queue up to this).
pub const JOB_MAX_ATTEMPTS: i32 = 3;
/// Bound on the idle wait before re-polling when no notification arrives.
pub const IDLE_WAIT_SECS: u64 = 2;
