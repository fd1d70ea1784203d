//! # Closure tasks for the runner.
//!
//! [`TaskFn`] turns a closure into a [`Task`] that [`run_async`](crate::run_async)
//! and [`run_all`](crate::run_all) can launch. It is what a capability reaches for
//! when a lifecycle transition has background work of its own, and what
//! [`Group`](crate::Group) uses to start each member concurrently.
//!
//! The closure is called once per launch with the child token the runner hands
//! out. That token is cancelled when the first timeout window elapses, so long
//! running bodies should select on it.
//!
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use hostvisor::{Logger, Scope, TaskError, TaskFn, run_async};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let warm_cache = TaskFn::arc("warm-cache", |token: CancellationToken| async move {
//!     tokio::select! {
//!         _ = token.cancelled() => Err(TaskError::Canceled),
//!         _ = tokio::time::sleep(Duration::from_millis(5)) => Ok(()),
//!     }
//! });
//!
//! let scope = Scope::root(&Logger::test());
//! let mut result = run_async(&scope, Duration::from_secs(1), warm_cache);
//! assert_eq!(result.wait().await, Ok(()));
//! # }
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::task::{BoxTaskFuture, Task};

/// A named closure that yields one transition-side future per launch.
///
/// State shared between launches must be captured explicitly (an `Arc`, a
/// channel); the closure itself is only borrowed.
#[derive(Debug)]
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    /// The name shows up as the `task` field in runner logs.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Shorthand for the shared form the runner takes.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture {
        Box::pin((self.f)(ctx))
    }
}
