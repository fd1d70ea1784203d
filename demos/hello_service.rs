//! # Example: hello_service
//!
//! Hosts a group of two capabilities (an HTTP-flavoured ticker and a background
//! process) behind one service and runs it until Ctrl-C / SIGTERM.
//!
//! Demonstrates how to:
//! - Describe capabilities with [`CapabilityFn`] and [`ServerConfig`].
//! - Fan them out with [`Group`].
//! - Spawn background work from `start` with [`run_async`] and halt it from `stop`.
//! - Drive the whole thing with [`hostvisor::run`].
//!
//! ## Flow
//! ```text
//! run(&service, &cfg)
//!     ├─► Service::start ─► Group::start ─► http.start ∥ worker.start
//!     ├─► wait_for_shutdown_signal()
//!     └─► Service::stop  ─► worker.stop ─► http.stop
//! ```
//!
//! ## Run
//! ```bash
//! HOSTVISOR_ENV=local HOSTVISOR_LOG=debug cargo run --example hello_service
//! ```

use std::time::Duration;

use hostvisor::{
    AppConfig, CapabilityFn, Group, Scope, ServerConfig, Service, TaskError, TaskFn, run_async,
};
use tokio_util::sync::CancellationToken;

fn ticker(name: &'static str, every: Duration) -> CapabilityFn {
    let halt = CancellationToken::new();
    let on_stop = halt.clone();
    CapabilityFn::new(name)
        .on_start(move |scope: Scope| {
            let halt = halt.clone();
            async move {
                let task = TaskFn::arc(name, move |ctx: CancellationToken| {
                    let halt = halt.clone();
                    async move {
                        let mut ticks = 0u64;
                        loop {
                            tokio::select! {
                                _ = ctx.cancelled() => return Ok::<_, TaskError>(()),
                                _ = halt.cancelled() => return Ok(()),
                                _ = tokio::time::sleep(every) => {
                                    ticks += 1;
                                    tracing::info!(ticks, "tick");
                                }
                            }
                        }
                    }
                });
                // Zero timeout: runs until halted or the scope is cancelled.
                drop(run_async(&scope, Duration::ZERO, task));
                Ok(())
            }
        })
        .on_stop(move |_scope: Scope| {
            let halt = on_stop.clone();
            async move {
                halt.cancel();
                Ok(())
            }
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration from HOSTVISOR_* variables
    let cfg = AppConfig::from_env()?.with_service_name("hello");

    // 2. Capabilities
    let http = ticker("http", Duration::from_secs(2))
        .with_config(ServerConfig::http("http", "127.0.0.1", 8080));
    let worker = ticker("worker", Duration::from_secs(3))
        .with_config(ServerConfig::process("worker"));

    // 3. One service hosting both
    let group = Group::new("hello")
        .with_member(http)
        .with_member(worker)
        .with_timeout(Duration::from_secs(5));
    let service = Service::new(&cfg, group);

    // 4. Start, wait for a signal, stop
    hostvisor::run(&service, &cfg).await?;
    println!("final state: {}", service.state());
    Ok(())
}
