//! # hostvisor
//!
//! **Hostvisor** gives heterogeneous long-running components (HTTP listeners,
//! RPC listeners, background processes, groups of them) one start/stop
//! lifecycle, and runs async work in the background bounded by a timeout.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │  Capability  │   │  Capability  │   │    Group     │──► members (Capability…)
//!   │ (http, :80)  │   │  (process)   │   │ (fan-out)    │
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Service<C> (lifecycle wrapper)                                   │
//! │  - LifecycleState machine (Constructed → Running → Stopped …)     │
//! │  - Logger + Scope (service-name chain, span, cancellation token)  │
//! │  - ServerMetrics (start/stop counters)                            │
//! └──────┬──────────────────────────────────────┬─────────────────────┘
//!        │ register(&mut impl Registrar)        │ run(&service, &cfg)
//!        ▼                                      ▼
//! ┌──────────────────────┐           ┌──────────────────────────────┐
//! │ HookSet / host hooks │           │ bootstrap: start ─► signal   │
//! │ on_start / on_stop   │           │            ─► stop (bounded) │
//! └──────────────────────┘           └──────────────────────────────┘
//! ```
//!
//! ### Task runner
//! ```text
//! run_async(scope, timeout, task) ──► TaskResult (channel, capacity 2)
//!   ├─ outcome before timeout ─► Ok / Err(e) verbatim
//!   └─ timeout elapsed        ─► Err(Timeout), child token cancelled,
//!                                task keeps running, real outcome follows
//! run_all(scope, timeout, tasks) ──► Vec<TaskResult> (input order)
//! wait_all(results)               ──► first error by index
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / functions                      |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Capabilities**  | Contract for hosted units of work and their metadata.         | [`Capability`], [`CapabilityFn`], [`ServerConfig`] |
//! | **Lifecycle**     | Logged, state-tracked start/stop around one capability.       | [`Service`], [`LifecycleState`]            |
//! | **Fan-out**       | Several capabilities behind one lifecycle.                    | [`Group`]                                  |
//! | **Tasks**         | Background work bounded by an advisory timeout.               | [`run_async`], [`run_all`], [`TaskFn`]     |
//! | **Bootstrap**     | Start, wait for a termination signal, stop.                   | [`run`], [`run_until`]                     |
//! | **Registration**  | Attach start/stop to a host lifecycle.                        | [`Registrar`], [`HookSet`]                 |
//! | **Configuration** | Environment, service name and transition budgets.             | [`AppConfig`], [`Env`]                     |
//! | **Errors**        | Typed errors for tasks, bootstrap and configuration.          | [`TaskError`], [`RuntimeError`]            |
//!
//! ## Example
//! ```rust,no_run
//! use hostvisor::{AppConfig, CapabilityFn, Scope, ServerConfig, Service, TaskError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = AppConfig::from_env()?.with_service_name("hello");
//!
//!     let api = CapabilityFn::new("api")
//!         .with_config(ServerConfig::http("api", "0.0.0.0", 8080))
//!         .on_start(|scope: Scope| async move {
//!             tokio::spawn(async move { scope.token().cancelled().await });
//!             Ok::<_, TaskError>(())
//!         });
//!
//!     let service = Service::new(&cfg, api);
//!     hostvisor::run(&service, &cfg).await?;
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod logger;
mod scope;
mod service;
mod tasks;

// ---- Public re-exports ----

pub use config::{
    AppConfig, DEFAULT_TRANSITION_TIMEOUT, ENV_VAR, Env, SERVICE_VAR, START_TIMEOUT_VAR,
    STOP_TIMEOUT_VAR,
};
pub use core::{
    RESULT_CAPACITY, TaskResult, run, run_all, run_async, run_until, wait_all,
    wait_for_shutdown_signal,
};
pub use error::{ConfigError, RuntimeError, TaskError};
pub use logger::{LOG_VAR, Logger};
pub use scope::Scope;
pub use service::{
    Capability, CapabilityFn, Group, Hook, HookSet, LifecycleState, MetricsSnapshot, Registrar,
    ServerConfig, ServerKind, ServerMetrics, Service,
};
pub use tasks::{BoxTaskFuture, Task, TaskFn, TaskRef};
