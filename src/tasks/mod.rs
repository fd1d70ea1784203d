//! # Background work units run by [`run_async`](crate::run_async).
//!
//! - [`Task`]: named, cancelable unit producing a fresh future per launch;
//! - [`TaskFn`]: closure-backed [`Task`];
//! - [`TaskRef`]: `Arc<dyn Task>`, the form the runner accepts in batches.

mod task;
mod task_fn;

pub use task::{BoxTaskFuture, Task, TaskRef};
pub use task_fn::TaskFn;
