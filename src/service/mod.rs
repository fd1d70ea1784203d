//! Hosted services: the capability contract, the lifecycle wrapper around it,
//! fan-out groups and process-lifecycle registration.
//!
//! - [`capability`]: what a hosted unit of work exposes;
//! - [`lifecycle`]: [`Service`], the state machine sequencing start/stop;
//! - [`group`]: several capabilities behind one lifecycle;
//! - [`hooks`]: [`Registrar`] and the in-crate [`HookSet`].

mod capability;
mod group;
mod hooks;
mod lifecycle;

pub use capability::{Capability, CapabilityFn, ServerConfig, ServerKind};
pub use group::Group;
pub use hooks::{Hook, HookSet, Registrar};
pub use lifecycle::{LifecycleState, MetricsSnapshot, ServerMetrics, Service};
