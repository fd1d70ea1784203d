//! Runtime core: task execution and process bootstrap.
//!
//! - [`runner`]: runs tasks on their own tokio tasks, bounded by a timeout window;
//! - [`bootstrap`]: starts one service, waits for a termination signal, stops it;
//! - [`shutdown`]: cross-platform termination signal handling.

mod bootstrap;
mod runner;
mod shutdown;

pub use bootstrap::{run, run_until};
pub use runner::{RESULT_CAPACITY, TaskResult, run_all, run_async, wait_all};
pub use shutdown::wait_for_shutdown_signal;
