//! # Environment-tagged logger construction.
//!
//! A [`Logger`] owns an explicitly built `tracing` [`Dispatch`]. No process-wide
//! default collector is installed: the dispatch travels inside the
//! [`Scope`](crate::Scope) and every lifecycle event is emitted through it.
//!
//! Output format by environment:
//! - `local` / `test`: human-readable lines on stderr, with file and line
//! - `prod`: JSON lines on stderr, including the current span chain
//!
//! Level filter: the `HOSTVISOR_LOG` variable (an `EnvFilter` directive such as
//! `info` or `hostvisor=debug`), falling back to `info` (`debug` for `test`).

use std::fmt;
use std::sync::Arc;

use tracing::Dispatch;
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use crate::config::Env;

/// Environment variable holding the log filter directive.
pub const LOG_VAR: &str = "HOSTVISOR_LOG";

/// Structured logger keyed by environment and service name.
///
/// Cheap to clone (the dispatch is reference counted).
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    env: Env,
    service: Arc<str>,
}

impl Logger {
    /// Builds the logger for `env`, tagging it with `service`.
    pub fn new(env: Env, service: impl Into<String>) -> Self {
        let filter = filter_for(env);
        let dispatch = match env {
            Env::Local | Env::Test => Dispatch::new(
                tfmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .finish(),
            ),
            Env::Prod => Dispatch::new(
                tfmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .finish(),
            ),
        };
        Self::from_dispatch(env, service, dispatch)
    }

    /// Logger for tests: debug level, written through the libtest capture writer.
    pub fn test() -> Self {
        let dispatch = Dispatch::new(
            tfmt()
                .with_env_filter(EnvFilter::new("debug"))
                .with_test_writer()
                .finish(),
        );
        Self::from_dispatch(Env::Test, "test", dispatch)
    }

    /// Wraps a caller-built collector.
    pub fn from_dispatch(env: Env, service: impl Into<String>, dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            env,
            service: Arc::from(service.into()),
        }
    }

    /// Returns the same collector tagged with another service name.
    pub fn for_service(&self, service: impl Into<String>) -> Self {
        Self::from_dispatch(self.env, service, self.dispatch.clone())
    }

    /// The underlying dispatch.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Environment this logger was built for.
    pub fn env(&self) -> Env {
        self.env
    }

    /// Service name this logger is tagged with.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Runs `f` with this logger as the thread's default collector.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("env", &self.env)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

fn filter_for(env: Env) -> EnvFilter {
    let default = match env {
        Env::Test => "debug",
        Env::Local | Env::Prod => "info",
    };
    EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new(default))
}
