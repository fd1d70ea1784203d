//! # Group of capabilities hosted as one.
//!
//! A [`Group`] is itself a [`Capability`], so a [`Service`](crate::Service) can
//! host several listeners/processes behind a single lifecycle:
//!
//! ```text
//! start(scope)                                   stop(scope)
//!   run_all(scope, timeout, [m1, m2, m3])          m3.stop(scope+m3)
//!     ├─ m1.start(scope+m1) ─┐                     m2.stop(scope+m2)
//!     ├─ m2.start(scope+m2) ─┼─► wait_all          m1.stop(scope+m1)
//!     └─ m3.start(scope+m3) ─┘   first error        first error (all attempted)
//! ```
//!
//! Members start concurrently, each bounded by the group timeout; members
//! stop sequentially in reverse order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::DEFAULT_TRANSITION_TIMEOUT;
use crate::core::{run_all, wait_all};
use crate::error::TaskError;
use crate::scope::Scope;
use crate::service::capability::{Capability, ServerConfig};
use crate::tasks::{TaskFn, TaskRef};

/// Capability fanning its transitions out to member capabilities.
pub struct Group {
    config: ServerConfig,
    members: Vec<Arc<dyn Capability>>,
    timeout: Duration,
}

impl Group {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: ServerConfig::group(name),
            members: Vec::new(),
            timeout: DEFAULT_TRANSITION_TIMEOUT,
        }
    }

    /// Appends a member; members start concurrently and stop in reverse order.
    pub fn with_member(mut self, member: impl Capability) -> Self {
        self.members.push(Arc::new(member));
        self
    }

    /// Bounds each member's start. `Duration::ZERO` disables the bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` when the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member names in declaration order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name())
    }

    fn start_task(scope: &Scope, member: &Arc<dyn Capability>) -> TaskRef {
        let scope = scope.clone();
        let member = Arc::clone(member);
        let name = member.name().to_string();
        TaskFn::arc(name, move |token: CancellationToken| {
            let scope = scope.with_token(token).with_name(member.name());
            let member = Arc::clone(&member);
            async move { member.start(&scope).await }
        })
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.config.name)
            .field("members", &self.member_names().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl Capability for Group {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn server_config(&self) -> Option<&ServerConfig> {
        Some(&self.config)
    }

    async fn start(&self, scope: &Scope) -> Result<(), TaskError> {
        let tasks: Vec<TaskRef> = self
            .members
            .iter()
            .map(|member| Self::start_task(scope, member))
            .collect();
        wait_all(run_all(scope, self.timeout, tasks)).await
    }

    async fn stop(&self, scope: &Scope) -> Result<(), TaskError> {
        let mut first_err = None;
        for member in self.members.iter().rev() {
            let member_scope = scope.with_name(member.name());
            if let Err(err) = member_scope.instrument(member.stop(&member_scope)).await {
                scope.in_scope(|| {
                    warn!(member = %member.name(), error = %err, "member failed to stop")
                });
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
