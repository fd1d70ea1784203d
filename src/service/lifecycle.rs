//! # Lifecycle wrapper.
//!
//! [`Service`] owns exactly one [`Capability`] for its whole lifetime and
//! sequences its transitions, logging each step with the capability's name and
//! [`ServerConfig`](crate::ServerConfig).
//!
//! ## State machine
//! ```text
//!                 start()                    Ok
//! Constructed ───────────► Starting ─────────────────► Running
//!   Stopped                   │ Err                       │
//!   StopFailed                ▼                           │ stop()
//!   StartFailed ◄──────── StartFailed ───── stop() ──┐    │
//!                                                    ▼    ▼
//!                                                   Stopping ──Ok──► Stopped
//!                                                       │
//!                                                       └──Err──► StopFailed
//! ```
//!
//! ## Rules
//! - `start` while `Starting`/`Running` is rejected with [`TaskError::Fatal`]
//!   and the capability is not invoked.
//! - `stop` is always attempted, from any state (also without a prior `start`).
//! - Errors from the capability are logged and returned unchanged.
//! - Before delegating, the scope is decorated with the capability's name.
//! - Transitions are expected to be driven serially by one caller.
//! - Budgets are advisory: on expiry the transition's child token is cancelled
//!   and the capability is still awaited; the transition then fails with
//!   [`TaskError::Timeout`].
//! - A transition future dropped before completion leaves the service in
//!   `StartFailed`/`StopFailed`, never stuck in `Starting`/`Stopping`.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time;
use tracing::{Level, debug, warn};

use crate::config::AppConfig;
use crate::error::TaskError;
use crate::logger::Logger;
use crate::scope::Scope;
use crate::service::capability::Capability;
use crate::service::hooks::{Hook, Registrar};

/// Emits a lifecycle event carrying the capability's name and metadata.
///
/// Host and port are only attached for network kinds.
macro_rules! server_event {
    ($lvl:expr, $cap:expr, $msg:literal $(, $($field:tt)+)?) => {{
        let server_name = $cap.name();
        match $cap.server_config() {
            Some(cfg) if cfg.kind.is_network() => tracing::event!(
                $lvl,
                server_name = %server_name,
                server_type = %cfg.kind,
                host = %cfg.host,
                port = cfg.port
                $(, $($field)+)?,
                $msg
            ),
            Some(cfg) => tracing::event!(
                $lvl,
                server_name = %server_name,
                server_type = %cfg.kind
                $(, $($field)+)?,
                $msg
            ),
            None => tracing::event!($lvl, server_name = %server_name $(, $($field)+)?, $msg),
        }
    }};
}

/// Lifecycle state of a [`Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Built, never started.
    Constructed,
    /// `start` in progress.
    Starting,
    /// Capability started successfully.
    Running,
    /// Capability `start` returned an error.
    StartFailed,
    /// `stop` in progress.
    Stopping,
    /// Capability stopped successfully.
    Stopped,
    /// Capability `stop` returned an error.
    StopFailed,
}

impl LifecycleState {
    /// Stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::StartFailed => "start_failed",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::StopFailed => "stop_failed",
        }
    }

    /// Whether `start` is allowed from this state.
    pub fn can_start(&self) -> bool {
        !matches!(self, LifecycleState::Starting | LifecycleState::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition counters of a service.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    starts: AtomicU64,
    start_failures: AtomicU64,
    stops: AtomicU64,
    stop_failures: AtomicU64,
}

/// Point-in-time copy of [`ServerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Successful starts.
    pub starts: u64,
    /// Failed starts.
    pub start_failures: u64,
    /// Successful stops.
    pub stops: u64,
    /// Failed stops.
    pub stop_failures: u64,
}

impl ServerMetrics {
    /// Reads all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            starts: self.starts.load(Ordering::Relaxed),
            start_failures: self.start_failures.load(Ordering::Relaxed),
            stops: self.stops.load(Ordering::Relaxed),
            stop_failures: self.stop_failures.load(Ordering::Relaxed),
        }
    }

    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Lifecycle wrapper around one [`Capability`].
pub struct Service<C> {
    logger: Logger,
    metrics: ServerMetrics,
    capability: C,
    state: Mutex<LifecycleState>,
    registered: AtomicBool,
}

impl<C: Capability> Service<C> {
    /// Wraps `capability` with a logger built from `cfg`.
    pub fn new(cfg: &AppConfig, capability: C) -> Self {
        Self::with_logger(Logger::new(cfg.env, &cfg.service_name), capability)
    }

    /// Builds the capability from the service logger, then wraps it.
    pub fn build<F>(cfg: &AppConfig, factory: F) -> Self
    where
        F: FnOnce(&Logger) -> C,
    {
        let logger = Logger::new(cfg.env, &cfg.service_name);
        let capability = factory(&logger);
        Self::with_logger(logger, capability)
    }

    /// Wraps `capability` with an existing logger.
    pub fn with_logger(logger: Logger, capability: C) -> Self {
        Self {
            logger,
            metrics: ServerMetrics::default(),
            capability,
            state: Mutex::new(LifecycleState::Constructed),
            registered: AtomicBool::new(false),
        }
    }

    /// Name of the hosted capability.
    pub fn name(&self) -> &str {
        self.capability.name()
    }

    /// The hosted capability.
    pub fn capability(&self) -> &C {
        &self.capability
    }

    /// The service logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Transition counters.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Root scope bound to the service logger.
    pub fn root_scope(&self) -> Scope {
        Scope::root(&self.logger)
    }

    /// Starts the capability.
    ///
    /// Returns the capability's error unchanged, or [`TaskError::Fatal`] when the
    /// service is already starting or running.
    pub async fn start(&self, scope: &Scope) -> Result<(), TaskError> {
        self.start_within(scope, None).await
    }

    /// Starts the capability with an advisory budget.
    ///
    /// When `budget` elapses the transition's token is cancelled, the capability
    /// is awaited until it returns, and the start is recorded as failed with
    /// [`TaskError::Timeout`]. `None` or a zero budget waits without bound.
    pub async fn start_within(
        &self,
        scope: &Scope,
        budget: Option<Duration>,
    ) -> Result<(), TaskError> {
        if let Err(current) = self.begin_start() {
            scope.in_scope(|| {
                server_event!(Level::WARN, self.capability, "start rejected", state = %current)
            });
            return Err(TaskError::fatal(format!(
                "{} is already {current}",
                self.name()
            )));
        }

        scope.in_scope(|| server_event!(Level::INFO, self.capability, "starting server"));
        let mut pending =
            Pending::new(self, LifecycleState::StartFailed, &self.metrics.start_failures);
        let scope = scope.child().with_name(self.name());
        let res = self
            .bounded(&scope, budget, self.capability.start(&scope))
            .await;
        pending.disarm();

        match &res {
            Ok(()) => {
                self.set_state(LifecycleState::Running);
                ServerMetrics::record(&self.metrics.starts);
                scope.in_scope(|| server_event!(Level::INFO, self.capability, "started"));
            }
            Err(err) => {
                self.set_state(LifecycleState::StartFailed);
                ServerMetrics::record(&self.metrics.start_failures);
                scope.in_scope(|| {
                    server_event!(
                        Level::ERROR,
                        self.capability,
                        "failed to start",
                        error = %err,
                        kind = err.as_label()
                    )
                });
            }
        }
        res
    }

    /// Stops the capability.
    ///
    /// Always delegates to the capability, whatever the current state.
    pub async fn stop(&self, scope: &Scope) -> Result<(), TaskError> {
        self.stop_within(scope, None).await
    }

    /// Stops the capability with an advisory budget (see [`Service::start_within`]).
    pub async fn stop_within(
        &self,
        scope: &Scope,
        budget: Option<Duration>,
    ) -> Result<(), TaskError> {
        let previous = self.replace_state(LifecycleState::Stopping);
        scope.in_scope(|| {
            server_event!(Level::INFO, self.capability, "stopping server", from = %previous)
        });
        let mut pending =
            Pending::new(self, LifecycleState::StopFailed, &self.metrics.stop_failures);
        let scope = scope.child().with_name(self.name());
        let res = self
            .bounded(&scope, budget, self.capability.stop(&scope))
            .await;
        pending.disarm();

        match &res {
            Ok(()) => {
                self.set_state(LifecycleState::Stopped);
                ServerMetrics::record(&self.metrics.stops);
                scope.in_scope(|| server_event!(Level::INFO, self.capability, "stopped"));
            }
            Err(err) => {
                self.set_state(LifecycleState::StopFailed);
                ServerMetrics::record(&self.metrics.stop_failures);
                scope.in_scope(|| {
                    server_event!(
                        Level::ERROR,
                        self.capability,
                        "failed to stop",
                        error = %err,
                        kind = err.as_label()
                    )
                });
            }
        }
        res
    }

    /// Awaits `fut` inside `scope`, racing it against `budget`.
    ///
    /// The future is never dropped early: on expiry the scope is cancelled and
    /// the capability's late outcome is only logged.
    async fn bounded<F>(
        &self,
        scope: &Scope,
        budget: Option<Duration>,
        fut: F,
    ) -> Result<(), TaskError>
    where
        F: Future<Output = Result<(), TaskError>>,
    {
        let fut = scope.instrument(fut);
        let Some(budget) = budget.filter(|b| !b.is_zero()) else {
            return fut.await;
        };

        tokio::pin!(fut);
        tokio::select! {
            biased;
            res = &mut fut => return res,
            _ = time::sleep(budget) => {}
        }

        scope.cancel();
        scope.in_scope(|| {
            server_event!(
                Level::WARN,
                self.capability,
                "transition exceeded its budget; waiting for capability",
                budget = ?budget
            )
        });
        let late = fut.await;
        scope.in_scope(|| debug!(outcome = ?late, "capability returned after budget"));
        Err(TaskError::Timeout { timeout: budget })
    }

    /// Attaches `start` as the registrar's on-start callback and `stop` as its
    /// on-stop callback.
    ///
    /// Registration happens once per service; later calls are ignored and
    /// return `false`.
    pub fn register<R>(self: &Arc<Self>, registrar: &mut R) -> bool
    where
        R: Registrar + ?Sized,
    {
        if self.registered.swap(true, Ordering::SeqCst) {
            self.logger
                .in_scope(|| warn!(server_name = %self.name(), "service already registered"));
            return false;
        }

        let on_start = Arc::clone(self);
        let on_stop = Arc::clone(self);
        registrar.append(Hook::new(
            self.name(),
            move |scope: Scope| {
                let service = Arc::clone(&on_start);
                async move { service.start(&scope).await }
            },
            move |scope: Scope| {
                let service = Arc::clone(&on_stop);
                async move { service.stop(&scope).await }
            },
        ));
        true
    }

    fn begin_start(&self) -> Result<(), LifecycleState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_start() {
            return Err(*state);
        }
        *state = LifecycleState::Starting;
        Ok(())
    }

    fn replace_state(&self, next: LifecycleState) -> LifecycleState {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *state, next)
    }

    fn set_state(&self, next: LifecycleState) {
        self.replace_state(next);
    }
}

/// Marks a transition as failed if its future is dropped before completion.
struct Pending<'a> {
    state: &'a Mutex<LifecycleState>,
    failures: &'a AtomicU64,
    logger: &'a Logger,
    abandoned: LifecycleState,
    armed: bool,
}

impl<'a> Pending<'a> {
    fn new<C>(
        service: &'a Service<C>,
        abandoned: LifecycleState,
        failures: &'a AtomicU64,
    ) -> Self {
        Self {
            state: &service.state,
            failures,
            logger: &service.logger,
            abandoned,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = self.abandoned;
        ServerMetrics::record(self.failures);
        self.logger
            .in_scope(|| warn!(state = %self.abandoned, "transition abandoned before completion"));
    }
}

impl<C: Capability> fmt::Debug for Service<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::capability::{CapabilityFn, ServerConfig};
    use crate::service::hooks::HookSet;
    use std::sync::atomic::AtomicUsize;

    fn service(cap: CapabilityFn) -> Service<CapabilityFn> {
        Service::with_logger(Logger::test(), cap)
    }

    fn counting_stop(counter: &Arc<AtomicUsize>) -> CapabilityFn {
        let counter = counter.clone();
        CapabilityFn::new("counted")
            .with_config(ServerConfig::http("counted", "localhost", 8080))
            .on_stop(move |_scope: Scope| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
    }

    #[tokio::test]
    async fn start_then_stop_ends_stopped() {
        let svc = service(CapabilityFn::new("noop"));
        let scope = svc.root_scope();
        assert_eq!(svc.state(), LifecycleState::Constructed);

        svc.start(&scope).await.unwrap();
        assert_eq!(svc.state(), LifecycleState::Running);
        svc.stop(&scope).await.unwrap();
        assert_eq!(svc.state(), LifecycleState::Stopped);

        let m = svc.metrics().snapshot();
        assert_eq!((m.starts, m.stops), (1, 1));
    }

    #[tokio::test]
    async fn failed_start_is_returned_unchanged_and_stop_still_runs() {
        let svc = service(
            CapabilityFn::new("broken")
                .on_start(|_scope: Scope| async { Err(TaskError::fail("example error")) }),
        );
        let scope = svc.root_scope();

        assert_eq!(svc.start(&scope).await, Err(TaskError::fail("example error")));
        assert_eq!(svc.state(), LifecycleState::StartFailed);

        svc.stop(&scope).await.unwrap();
        assert_eq!(svc.state(), LifecycleState::Stopped);
        assert_eq!(svc.metrics().snapshot().start_failures, 1);
    }

    #[tokio::test]
    async fn failed_stop_is_returned_unchanged() {
        let svc = service(
            CapabilityFn::new("sticky")
                .on_stop(|_scope: Scope| async { Err(TaskError::fail("still busy")) }),
        );
        let scope = svc.root_scope();

        svc.start(&scope).await.unwrap();
        assert_eq!(svc.stop(&scope).await, Err(TaskError::fail("still busy")));
        assert_eq!(svc.state(), LifecycleState::StopFailed);
    }

    #[tokio::test]
    async fn stop_without_start_invokes_capability_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let svc = service(counting_stop(&counter));

        svc.stop(&svc.root_scope()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(svc.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn second_start_is_rejected_until_stopped() {
        let starts = Arc::new(AtomicUsize::new(0));
        let seen = starts.clone();
        let svc = service(CapabilityFn::new("once").on_start(move |_scope: Scope| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
        let scope = svc.root_scope();

        svc.start(&scope).await.unwrap();
        let err = svc.start(&scope).await.unwrap_err();
        assert_eq!(err.as_label(), "task_fatal");
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(svc.state(), LifecycleState::Running);

        svc.stop(&scope).await.unwrap();
        svc.start(&scope).await.unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capability_sees_its_name_in_scope() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let seen = names.clone();
        let svc = service(CapabilityFn::new("api").on_start(move |scope: Scope| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().extend(scope.names().iter().cloned());
                Ok(())
            }
        }));
        let root = svc.root_scope().with_name("outer");

        svc.start(&root).await.unwrap();
        assert_eq!(*names.lock().unwrap(), ["outer", "api"]);
        assert_eq!(root.names(), ["outer"]);
    }

    #[tokio::test]
    async fn registers_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let svc = Arc::new(service(counting_stop(&counter)));
        let mut hooks = HookSet::new();

        assert!(svc.register(&mut hooks));
        assert!(!svc.register(&mut hooks));
        assert_eq!(hooks.len(), 1);

        let scope = svc.root_scope();
        hooks.start_all(&scope).await.unwrap();
        assert_eq!(svc.state(), LifecycleState::Running);
        hooks.stop_all(&scope).await.unwrap();
        assert_eq!(svc.state(), LifecycleState::Stopped);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_start_budget_fails_the_start_without_aborting_it() {
        let finished = Arc::new(AtomicBool::new(false));
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let (done, cancelled) = (finished.clone(), saw_cancel.clone());
        let svc = service(CapabilityFn::new("slow").on_start(move |scope: Scope| {
            let (done, cancelled) = (done.clone(), cancelled.clone());
            async move {
                time::sleep(Duration::from_secs(3)).await;
                cancelled.store(scope.is_cancelled(), Ordering::SeqCst);
                done.store(true, Ordering::SeqCst);
                Ok(())
            }
        }));
        let root = svc.root_scope();

        let res = svc.start_within(&root, Some(Duration::from_secs(2))).await;
        assert_eq!(res, Err(TaskError::Timeout { timeout: Duration::from_secs(2) }));
        assert!(finished.load(Ordering::SeqCst));
        assert!(saw_cancel.load(Ordering::SeqCst));
        assert!(!root.is_cancelled());
        assert_eq!(svc.state(), LifecycleState::StartFailed);

        let m = svc.metrics().snapshot();
        assert_eq!((m.starts, m.start_failures), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_start_does_not_leave_service_starting() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let svc = service(CapabilityFn::new("slow").on_start(move |_scope: Scope| {
            let seen = seen.clone();
            async move {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    time::sleep(Duration::from_secs(10)).await;
                }
                Ok(())
            }
        }));
        let scope = svc.root_scope();

        assert!(time::timeout(Duration::from_secs(1), svc.start(&scope)).await.is_err());
        assert_eq!(svc.state(), LifecycleState::StartFailed);
        assert_eq!(svc.metrics().snapshot().start_failures, 1);

        svc.start(&scope).await.unwrap();
        assert_eq!(svc.state(), LifecycleState::Running);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn lines(&self) -> Vec<String> {
            let raw = self.0.lock().unwrap().clone();
            String::from_utf8(raw).unwrap().lines().map(str::to_string).collect()
        }

        fn logger(&self) -> Logger {
            let writer = self.clone();
            let dispatch = tracing::Dispatch::new(
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(move || writer.clone())
                    .with_current_span(true)
                    .with_span_list(true)
                    .finish(),
            );
            Logger::from_dispatch(crate::config::Env::Prod, "cases", dispatch)
        }
    }

    fn line_with<'a>(lines: &'a [String], message: &str) -> &'a str {
        let needle = format!("\"message\":\"{message}\"");
        lines
            .iter()
            .find(|l| l.contains(&needle))
            .unwrap_or_else(|| panic!("no {message:?} event in {lines:#?}"))
    }

    #[tokio::test]
    async fn network_transitions_log_name_kind_host_and_port() {
        let captured = Captured::default();
        let svc = Service::with_logger(
            captured.logger(),
            CapabilityFn::new("api")
                .with_config(ServerConfig::http("api", "localhost", 8080))
                .on_stop(|_scope: Scope| async { Err(TaskError::fail("drain failed")) }),
        );
        let scope = svc.root_scope();
        svc.start(&scope).await.unwrap();
        svc.stop(&scope).await.unwrap_err();

        let lines = captured.lines();
        for message in ["starting server", "started", "stopping server"] {
            let line = line_with(&lines, message);
            assert!(line.contains("\"server_name\":\"api\""), "{line}");
            assert!(line.contains("\"server_type\":\"HttpServer\""), "{line}");
            assert!(line.contains("\"host\":\"localhost\""), "{line}");
            assert!(line.contains("\"port\":8080"), "{line}");
        }
        let failed = line_with(&lines, "failed to stop");
        assert!(failed.contains("\"level\":\"ERROR\""), "{failed}");
        assert!(failed.contains("\"error\":\"drain failed\""), "{failed}");

        // The decorated span keeps the capability name apart from the span name.
        let started = line_with(&lines, "started");
        assert!(started.contains("\"name\":\"server\""), "{started}");
        assert!(lines.iter().all(|l| !l.contains("\"name\":\"api\"")));
    }

    #[tokio::test]
    async fn process_transitions_omit_host_and_port() {
        let captured = Captured::default();
        let svc = Service::with_logger(
            captured.logger(),
            CapabilityFn::new("scheduler").with_config(ServerConfig::process("scheduler")),
        );
        let scope = svc.root_scope();
        svc.start(&scope).await.unwrap();
        svc.stop(&scope).await.unwrap();

        let lines = captured.lines();
        let started = line_with(&lines, "started");
        assert!(started.contains("\"server_type\":\"ProcessServer\""), "{started}");
        line_with(&lines, "stopped");
        assert!(lines.iter().all(|l| !l.contains("\"host\"") && !l.contains("\"port\"")));
    }
}
