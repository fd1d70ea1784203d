//! # Task abstraction.
//!
//! A [`Task`] is a named unit of concurrent work. Each call to [`Task::spawn`]
//! produces a fresh future that receives a [`CancellationToken`]; the task should
//! check it periodically and exit promptly once it is cancelled.
//!
//! The common handle type is [`TaskRef`], an `Arc<dyn Task>` suitable for moving
//! into runner threads.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Boxed future returned by [`Task::spawn`].
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Shared handle to a task object.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, cancelable unit.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use hostvisor::{BoxTaskFuture, Task};
///
/// struct Ping;
///
/// impl Task for Ping {
///     fn name(&self) -> &str { "ping" }
///
///     fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture {
///         Box::pin(async move {
///             if ctx.is_cancelled() {
///                 return Ok(());
///             }
///             // do work...
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Creates a new future for one execution of the task.
    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture;
}
