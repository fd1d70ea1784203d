//! # Call scope threaded through lifecycle transitions.
//!
//! A [`Scope`] bundles the values every transition needs: the environment tag,
//! the chain of service names entered so far, the [`Logger`], the `tracing`
//! span carrying those values, and a [`CancellationToken`].
//!
//! Scopes are immutable. Decorating returns a new scope:
//! ```text
//! Scope::root(logger)            names = []             span = service{service=cases env=test}
//!   └─ with_name("group")        names = [group]        span = ..:server{server_name=group}
//!        └─ with_name("http")    names = [group, http]  span = ..:server{server_name=http}
//! ```
//!
//! The token is shared by decorated scopes; [`Scope::child`] derives an
//! isolated child token (cancelled with the parent, never the other way round).

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::Span;
use tracing::instrument::{Instrument, Instrumented, WithDispatch, WithSubscriber};

use crate::config::Env;
use crate::logger::Logger;

/// Immutable call-scope record.
#[derive(Clone, Debug)]
pub struct Scope {
    env: Env,
    names: Vec<String>,
    logger: Logger,
    span: Span,
    token: CancellationToken,
}

impl Scope {
    /// Creates the root scope for `logger` with a fresh cancellation token.
    pub fn root(logger: &Logger) -> Self {
        Self::root_with_token(logger, CancellationToken::new())
    }

    /// Creates the root scope for `logger` bound to an existing token.
    pub fn root_with_token(logger: &Logger, token: CancellationToken) -> Self {
        let span = logger.in_scope(|| {
            tracing::info_span!(
                "service",
                service = %logger.service(),
                env = %logger.env()
            )
        });
        Self {
            env: logger.env(),
            names: Vec::new(),
            logger: logger.clone(),
            span,
            token,
        }
    }

    /// Returns a scope with `name` appended to the service-name chain.
    pub fn with_name(&self, name: &str) -> Self {
        let mut names = self.names.clone();
        names.push(name.to_string());
        let span = self.logger.in_scope(|| {
            tracing::info_span!(
                parent: &self.span,
                "server",
                server_name = %name,
                service_names = ?names
            )
        });
        Self {
            env: self.env,
            names,
            logger: self.logger.clone(),
            span,
            token: self.token.clone(),
        }
    }

    /// Returns a scope whose token is a child of this scope's token.
    pub fn child(&self) -> Self {
        self.with_token(self.token.child_token())
    }

    /// Returns a scope bound to `token`.
    pub fn with_token(&self, token: CancellationToken) -> Self {
        Self {
            token,
            ..self.clone()
        }
    }

    /// Environment tag.
    pub fn env(&self) -> Env {
        self.env
    }

    /// Service names entered so far, outermost first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Innermost service name, if any.
    pub fn current_name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    /// Logger the scope emits through.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Span carrying the scope's fields.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Cancellation token of this scope.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Signals cancellation to everything holding this scope's token (or a child of it).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the scope's token is cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Runs `f` inside the scope's span with the scope's logger as default collector.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.logger.in_scope(|| self.span.in_scope(f))
    }

    /// Attaches the scope's span and logger to `fut`.
    pub fn instrument<F: Future>(&self, fut: F) -> WithDispatch<Instrumented<F>> {
        fut.instrument(self.span.clone())
            .with_subscriber(self.logger.dispatch().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_names() {
        let scope = Scope::root(&Logger::test());
        assert!(scope.names().is_empty());
        assert_eq!(scope.current_name(), None);
        assert_eq!(scope.env(), Env::Test);
    }

    #[test]
    fn with_name_appends_without_touching_parent() {
        let root = Scope::root(&Logger::test());
        let group = root.with_name("group");
        let http = group.with_name("http");

        assert!(root.names().is_empty());
        assert_eq!(group.names(), ["group"]);
        assert_eq!(http.names(), ["group", "http"]);
        assert_eq!(http.current_name(), Some("http"));
    }

    #[test]
    fn decorated_scopes_share_the_token() {
        let root = Scope::root(&Logger::test());
        let named = root.with_name("svc");
        root.cancel();
        assert!(named.is_cancelled());
    }

    #[test]
    fn child_cancellation_does_not_reach_parent() {
        let root = Scope::root(&Logger::test());
        let child = root.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());

        let other = root.child();
        root.cancel();
        assert!(other.is_cancelled());
    }
}
