//! # Capability contract.
//!
//! A [`Capability`] is the unit of work a [`Service`](crate::Service) hosts: an
//! HTTP listener, an RPC listener, a background process, or a [`Group`](crate::Group)
//! of other capabilities. It exposes a display name, optional descriptive
//! metadata ([`ServerConfig`]) and async `start`/`stop` operations.
//!
//! ## Rules
//! - `start` may block until ready or return right after spawning background
//!   work; the caller considers the capability started once `start` returns `Ok`.
//! - `stop` must be safe to call when `start` never ran or failed.
//! - Cancellation wiring between `start` and `stop` is the capability's own
//!   business (the [`Scope`] token is available for it).

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::scope::Scope;
use crate::tasks::BoxTaskFuture;

/// Connection kind of a hosted capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    /// HTTP listener.
    Http,
    /// RPC (gRPC) listener.
    Rpc,
    /// Background process without a listening socket.
    Process,
    /// Group of sub-capabilities.
    Group,
}

impl ServerKind {
    /// Stable label used as the `server_type` log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Http => "HttpServer",
            ServerKind::Rpc => "gRPCServer",
            ServerKind::Process => "ProcessServer",
            ServerKind::Group => "GroupOfServers",
        }
    }

    /// Whether host and port are meaningful for this kind.
    pub fn is_network(&self) -> bool {
        matches!(self, ServerKind::Http | ServerKind::Rpc)
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata of a capability, read-only to the lifecycle wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server name.
    pub name: String,
    /// Bind host (network kinds only).
    pub host: String,
    /// Bind port (network kinds only).
    pub port: u16,
    /// Connection kind.
    pub kind: ServerKind,
}

impl ServerConfig {
    /// Metadata for an HTTP listener.
    pub fn http(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::with_kind(ServerKind::Http, name, host, port)
    }

    /// Metadata for an RPC listener.
    pub fn rpc(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::with_kind(ServerKind::Rpc, name, host, port)
    }

    /// Metadata for a background process.
    pub fn process(name: impl Into<String>) -> Self {
        Self::with_kind(ServerKind::Process, name, "", 0)
    }

    /// Metadata for a group of capabilities.
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(ServerKind::Group, name, "", 0)
    }

    fn with_kind(
        kind: ServerKind,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            kind,
        }
    }
}

/// # Hosted unit of work.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use hostvisor::{Capability, Scope, ServerConfig, TaskError};
///
/// struct Api {
///     config: ServerConfig,
/// }
///
/// #[async_trait]
/// impl Capability for Api {
///     fn name(&self) -> &str { &self.config.name }
///
///     fn server_config(&self) -> Option<&ServerConfig> { Some(&self.config) }
///
///     async fn start(&self, _scope: &Scope) -> Result<(), TaskError> { Ok(()) }
///
///     async fn stop(&self, _scope: &Scope) -> Result<(), TaskError> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    /// Identifier used for logging. Uniqueness is not enforced.
    fn name(&self) -> &str;

    /// Optional descriptive metadata.
    fn server_config(&self) -> Option<&ServerConfig> {
        None
    }

    /// Begins serving.
    async fn start(&self, scope: &Scope) -> Result<(), TaskError>;

    /// Begins graceful shutdown.
    async fn stop(&self, scope: &Scope) -> Result<(), TaskError>;
}

#[async_trait]
impl<C: Capability + ?Sized> Capability for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn server_config(&self) -> Option<&ServerConfig> {
        (**self).server_config()
    }

    async fn start(&self, scope: &Scope) -> Result<(), TaskError> {
        (**self).start(scope).await
    }

    async fn stop(&self, scope: &Scope) -> Result<(), TaskError> {
        (**self).stop(scope).await
    }
}

#[async_trait]
impl<C: Capability + ?Sized> Capability for Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn server_config(&self) -> Option<&ServerConfig> {
        (**self).server_config()
    }

    async fn start(&self, scope: &Scope) -> Result<(), TaskError> {
        (**self).start(scope).await
    }

    async fn stop(&self, scope: &Scope) -> Result<(), TaskError> {
        (**self).stop(scope).await
    }
}

type TransitionFn = Box<dyn Fn(Scope) -> BoxTaskFuture + Send + Sync>;

/// Closure-backed capability.
///
/// Both transitions default to no-ops.
///
/// ```
/// use hostvisor::{CapabilityFn, Scope, ServerConfig, TaskError};
///
/// let worker = CapabilityFn::new("worker")
///     .with_config(ServerConfig::process("worker"))
///     .on_start(|scope: Scope| async move {
///         tokio::spawn(async move { scope.token().cancelled().await });
///         Ok::<_, TaskError>(())
///     });
/// ```
pub struct CapabilityFn {
    name: Cow<'static, str>,
    config: Option<ServerConfig>,
    start: TransitionFn,
    stop: TransitionFn,
}

impl CapabilityFn {
    /// Creates a capability whose transitions do nothing.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            config: None,
            start: noop(),
            stop: noop(),
        }
    }

    /// Attaches descriptive metadata.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the start transition.
    pub fn on_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.start = Box::new(move |scope: Scope| -> BoxTaskFuture { Box::pin(f(scope)) });
        self
    }

    /// Sets the stop transition.
    pub fn on_stop<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.stop = Box::new(move |scope: Scope| -> BoxTaskFuture { Box::pin(f(scope)) });
        self
    }
}

fn noop() -> TransitionFn {
    Box::new(|_scope: Scope| -> BoxTaskFuture { Box::pin(async { Ok(()) }) })
}

impl fmt::Debug for CapabilityFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityFn")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Capability for CapabilityFn {
    fn name(&self) -> &str {
        &self.name
    }

    fn server_config(&self) -> Option<&ServerConfig> {
        self.config.as_ref()
    }

    async fn start(&self, scope: &Scope) -> Result<(), TaskError> {
        (self.start)(scope.clone()).await
    }

    async fn stop(&self, scope: &Scope) -> Result<(), TaskError> {
        (self.stop)(scope.clone()).await
    }
}
