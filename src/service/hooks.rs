//! # Process-lifecycle registration.
//!
//! A [`Registrar`] accepts [`Hook`]s: pairs of `on_start` / `on_stop`
//! callbacks. [`Service::register`](crate::Service::register) appends exactly
//! one hook per service.
//!
//! [`HookSet`] is the in-crate registrar:
//! ```text
//! append(h1), append(h2), append(h3)
//!
//! start_all:  h1.on_start → h2.on_start → h3.on_start
//!               └─ h2 fails → rollback: h1.on_stop → return h2's error
//! stop_all:   h3.on_stop → h2.on_stop → h1.on_stop   (started hooks only, all attempted)
//! ```

use std::fmt;
use std::future::Future;

use tracing::warn;

use crate::error::TaskError;
use crate::scope::Scope;
use crate::tasks::BoxTaskFuture;

type HookFn = Box<dyn Fn(Scope) -> BoxTaskFuture + Send + Sync>;

/// Accepts lifecycle hooks from services.
pub trait Registrar {
    /// Appends a hook; order of appends is the start order.
    fn append(&mut self, hook: Hook);
}

/// Named pair of lifecycle callbacks.
pub struct Hook {
    name: String,
    on_start: HookFn,
    on_stop: HookFn,
}

impl Hook {
    /// Creates a hook from two callbacks.
    pub fn new<S, SFut, T, TFut>(name: impl Into<String>, on_start: S, on_stop: T) -> Self
    where
        S: Fn(Scope) -> SFut + Send + Sync + 'static,
        SFut: Future<Output = Result<(), TaskError>> + Send + 'static,
        T: Fn(Scope) -> TFut + Send + Sync + 'static,
        TFut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            on_start: Box::new(move |scope: Scope| -> BoxTaskFuture { Box::pin(on_start(scope)) }),
            on_stop: Box::new(move |scope: Scope| -> BoxTaskFuture { Box::pin(on_stop(scope)) }),
        }
    }

    /// Name of the service that registered the hook.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the `on_start` callback.
    pub async fn start(&self, scope: &Scope) -> Result<(), TaskError> {
        (self.on_start)(scope.clone()).await
    }

    /// Invokes the `on_stop` callback.
    pub async fn stop(&self, scope: &Scope) -> Result<(), TaskError> {
        (self.on_stop)(scope.clone()).await
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Ordered hook list with start-in-order / stop-in-reverse semantics.
#[derive(Debug, Default)]
pub struct HookSet {
    hooks: Vec<Hook>,
    started: usize,
}

impl Registrar for HookSet {
    fn append(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }
}

impl HookSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Names of registered hooks, in start order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(Hook::name)
    }

    /// Runs every `on_start` in append order.
    ///
    /// On the first failure, hooks already started are stopped in reverse
    /// order and the failing hook's error is returned.
    pub async fn start_all(&mut self, scope: &Scope) -> Result<(), TaskError> {
        let mut failure = None;
        for (idx, hook) in self.hooks.iter().enumerate().skip(self.started) {
            if let Err(err) = hook.start(scope).await {
                failure = Some((idx, err));
                break;
            }
        }

        match failure {
            None => {
                self.started = self.hooks.len();
                Ok(())
            }
            Some((idx, err)) => {
                self.started = idx;
                if let Err(rollback) = self.stop_all(scope).await {
                    scope.in_scope(|| {
                        warn!(error = %rollback, "rollback after failed start also failed")
                    });
                }
                Err(err)
            }
        }
    }

    /// Runs `on_stop` for every started hook in reverse order.
    ///
    /// Every hook is attempted; the first error encountered is returned.
    pub async fn stop_all(&mut self, scope: &Scope) -> Result<(), TaskError> {
        let mut first_err = None;
        for hook in self.hooks[..self.started].iter().rev() {
            if let Err(err) = hook.stop(scope).await {
                scope.in_scope(|| warn!(hook = %hook.name(), error = %err, "stop hook failed"));
                first_err.get_or_insert(err);
            }
        }
        self.started = 0;
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
