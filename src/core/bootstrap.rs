//! # Process bootstrap: host one service until a termination signal.
//!
//! ```text
//! run(service, cfg)
//!   └─► run_until(service, cfg, wait_for_shutdown_signal())
//!         ├─► service.start_within(root, cfg.start_budget())
//!         │     ├─ Ok   ─► wait for shutdown future
//!         │     └─ Err  ─► stop (bounded) ─► RuntimeError::StartFailure
//!         ├─► shutdown resolves (or fails to listen)
//!         ├─► service.stop_within(root, cfg.stop_budget())
//!         │     └─ Err  ─► RuntimeError::StopFailure
//!         └─► cancel root token
//! ```
//!
//! ## Rules
//! - `stop` is invoked exactly once per bootstrap, also after a failed start.
//! - Budgets are enforced by the lifecycle wrapper: an elapsed budget cancels
//!   the transition's token and counts as [`TaskError::Timeout`]. The
//!   capability is still awaited, so it must observe its scope token.
//! - A zero budget waits without bound.

use std::future::Future;
use std::io;

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::service::{Capability, Service};

/// Starts `service`, waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C off unix), then stops it.
pub async fn run<C: Capability>(
    service: &Service<C>,
    cfg: &AppConfig,
) -> Result<(), RuntimeError> {
    run_until(service, cfg, shutdown::wait_for_shutdown_signal()).await
}

/// Same as [`run`] with a caller-provided shutdown trigger.
///
/// `shutdown` resolving with `Err` is treated as a signal-listener failure: the
/// service is stopped and [`RuntimeError::Signal`] returned.
pub async fn run_until<C, F>(
    service: &Service<C>,
    cfg: &AppConfig,
    shutdown: F,
) -> Result<(), RuntimeError>
where
    C: Capability,
    F: Future<Output = io::Result<()>>,
{
    let root = service.root_scope();
    let server = service.name().to_string();

    if let Err(source) = service.start_within(&root, cfg.start_budget()).await {
        root.in_scope(|| {
            error!(
                server = %server,
                error = %source.as_message(),
                retryable = source.is_retryable(),
                "startup failed; stopping"
            )
        });
        if let Err(stop_err) = service.stop_within(&root, cfg.stop_budget()).await {
            root.in_scope(|| {
                warn!(
                    server = %server,
                    error = %stop_err,
                    "stop after failed startup also failed"
                )
            });
        }
        root.cancel();
        return Err(RuntimeError::StartFailure { server, source });
    }

    root.in_scope(|| info!(server = %server, "waiting for shutdown signal"));
    let signal = shutdown.await;
    match &signal {
        Ok(()) => root.in_scope(|| info!(server = %server, "shutdown requested")),
        Err(e) => root.in_scope(|| {
            error!(server = %server, error = %e, "shutdown listener failed")
        }),
    }

    let stopped = service.stop_within(&root, cfg.stop_budget()).await;
    root.cancel();

    if let Err(source) = stopped {
        root.in_scope(|| error!(server = %server, error = %source.as_message(), "shutdown failed"));
        return Err(RuntimeError::StopFailure { server, source });
    }
    signal.map_err(|source| RuntimeError::Signal { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::logger::Logger;
    use crate::scope::Scope;
    use crate::service::{CapabilityFn, LifecycleState};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    fn counted(stops: &Arc<AtomicUsize>) -> CapabilityFn {
        let stops = stops.clone();
        CapabilityFn::new("counted").on_stop(move |_scope: Scope| {
            let stops = stops.clone();
            async move {
                stops.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn start_budget_cancels_and_times_out() {
        let stops = Arc::new(AtomicUsize::new(0));
        let svc = Service::with_logger(
            Logger::test(),
            counted(&stops).on_start(|scope: Scope| async move {
                scope.token().cancelled().await;
                Ok(())
            }),
        );
        let mut cfg = AppConfig::local_test();
        cfg.start_timeout = Duration::from_secs(2);

        let err = run_until(&svc, &cfg, std::future::pending()).await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_start_failure");
        assert!(err.task_error().is_some_and(TaskError::is_timeout));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_start_budget_is_recorded_by_the_service() {
        let stops = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();
        let svc = Service::with_logger(
            Logger::test(),
            counted(&stops).on_start(move |_scope: Scope| {
                let done = done.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    done.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        let mut cfg = AppConfig::local_test();
        cfg.start_timeout = Duration::from_secs(2);

        let err = run_until(&svc, &cfg, std::future::pending()).await.unwrap_err();
        assert_eq!(
            err.task_error(),
            Some(&TaskError::Timeout { timeout: Duration::from_secs(2) })
        );

        // The start body ran to completion; nothing was aborted.
        assert!(finished.load(Ordering::SeqCst));
        let m = svc.metrics().snapshot();
        assert_eq!((m.starts, m.start_failures, m.stops), (0, 1, 1));
        assert_eq!(svc.state(), LifecycleState::Stopped);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signal_failure_still_stops() {
        let stops = Arc::new(AtomicUsize::new(0));
        let svc = Service::with_logger(Logger::test(), counted(&stops));

        let err = run_until(&svc, &AppConfig::local_test(), async {
            Err(io::Error::other("no signals here"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Signal { .. }));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
