//! # Runtime configuration.
//!
//! Provides [`Env`] (the execution environment tag) and [`AppConfig`], the
//! settings the bootstrap and logger read at construction time.
//!
//! Config is used in two ways:
//! 1. **Logger creation**: `Logger::new(cfg.env, &cfg.service_name)`
//! 2. **Bootstrap budgets**: `hostvisor::run(&service, &cfg)`
//!
//! ## Sentinel values
//! - `start_timeout = 0s` → no startup budget
//! - `stop_timeout = 0s` → no shutdown budget

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable holding the environment tag (`local|test|prod`).
pub const ENV_VAR: &str = "HOSTVISOR_ENV";
/// Environment variable holding the service name.
pub const SERVICE_VAR: &str = "HOSTVISOR_SERVICE";
/// Environment variable holding the startup budget in seconds.
pub const START_TIMEOUT_VAR: &str = "HOSTVISOR_START_TIMEOUT_SECS";
/// Environment variable holding the shutdown budget in seconds.
pub const STOP_TIMEOUT_VAR: &str = "HOSTVISOR_STOP_TIMEOUT_SECS";

/// Default budget for each lifecycle transition driven by the bootstrap.
pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(30);

/// Execution environment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Env {
    /// Developer machine: human-readable logs.
    #[default]
    Local,
    /// Test runs: human-readable, verbose logs.
    Test,
    /// Production: JSON logs.
    Prod,
}

impl Env {
    /// Returns the lowercase tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Env::Local => "local",
            Env::Test => "test",
            Env::Prod => "prod",
        }
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Env::Local),
            "test" => Ok(Env::Test),
            "prod" | "production" => Ok(Env::Prod),
            _ => Err(ConfigError::UnknownEnv(s.to_string())),
        }
    }
}

/// Application-level configuration consumed by the runtime shell.
///
/// ## Field semantics
/// - `env`: selects the log format and default level
/// - `service_name`: root of the service-name chain attached to every log line
/// - `start_timeout`: budget for the bootstrap's start transition (`0s` = unbounded)
/// - `stop_timeout`: budget for the bootstrap's stop transition (`0s` = unbounded)
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Execution environment.
    pub env: Env,
    /// Name of the hosting service.
    pub service_name: String,
    /// Maximum time the bootstrap waits for `start`.
    pub start_timeout: Duration,
    /// Maximum time the bootstrap waits for `stop`.
    pub stop_timeout: Duration,
}

impl AppConfig {
    /// Configuration for local test runs (`Env::Test`).
    pub fn local_test() -> Self {
        Self {
            env: Env::Test,
            service_name: "test".to_string(),
            ..Self::default()
        }
    }

    /// Returns a copy with the given service name.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Reads overrides from `HOSTVISOR_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(env) = lookup(ENV_VAR) {
            cfg.env = env.parse()?;
        }
        if let Some(name) = lookup(SERVICE_VAR).filter(|n| !n.trim().is_empty()) {
            cfg.service_name = name;
        }
        if let Some(raw) = lookup(START_TIMEOUT_VAR) {
            cfg.start_timeout = parse_secs(START_TIMEOUT_VAR, &raw)?;
        }
        if let Some(raw) = lookup(STOP_TIMEOUT_VAR) {
            cfg.stop_timeout = parse_secs(STOP_TIMEOUT_VAR, &raw)?;
        }
        Ok(cfg)
    }

    /// Returns the startup budget as an `Option` (`None` = unbounded).
    #[inline]
    pub fn start_budget(&self) -> Option<Duration> {
        Some(self.start_timeout).filter(|d| !d.is_zero())
    }

    /// Returns the shutdown budget as an `Option` (`None` = unbounded).
    #[inline]
    pub fn stop_budget(&self) -> Option<Duration> {
        Some(self.stop_timeout).filter(|d| !d.is_zero())
    }
}

impl Default for AppConfig {
    /// Default configuration:
    ///
    /// - `env = Env::Local`
    /// - `service_name = "hostvisor"`
    /// - `start_timeout = 30s`, `stop_timeout = 30s`
    fn default() -> Self {
        Self {
            env: Env::Local,
            service_name: "hostvisor".to_string(),
            start_timeout: DEFAULT_TRANSITION_TIMEOUT,
            stop_timeout: DEFAULT_TRANSITION_TIMEOUT,
        }
    }
}

fn parse_secs(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        })
}
