//! Configuration resolution: command-line flags first, then environment
//! variables as overrides (the environment wins when both are set — the
//! opposite of clap's own built-in `env =` precedence, so the override is
//! applied as an explicit second pass rather than left to clap).

use std::fmt::Debug;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tracing::warn;

use crate::error::{AgentError, Result};

/// Flags common to both agent variants (spec.md §6).
#[derive(Parser, Debug)]
pub struct CommonArgs {
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub batching: bool,

    #[arg(long, default_value = "100ms")]
    pub batch_window: String,

    #[arg(long, default_value_t = 10)]
    pub max_batch_size: usize,

    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

/// The resolved, effective configuration shared by both agents.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub port: u16,
    pub batching_enabled: bool,
    pub batch_window: Duration,
    pub max_batch_size: usize,
    pub debug: bool,
}

impl SharedConfig {
    /// JSON representation served at `GET /debug/config`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "port": self.port,
            "batching_enabled": self.batching_enabled,
            "batch_window": humantime::format_duration(self.batch_window).to_string(),
            "max_batch_size": self.max_batch_size,
            "debug": self.debug,
        })
    }
}

impl SharedConfig {
    pub fn resolve(args: CommonArgs) -> Result<Self> {
        let port = env_override(args.port, "PORT")?;
        let batching_enabled = env_override(args.batching, "BATCHING_ENABLED")?;
        let batch_window_str = env_override_string(args.batch_window, "BATCH_WINDOW");
        let batch_window = humantime::parse_duration(&batch_window_str)
            .map_err(|e| AgentError::Config(format!("invalid batch window {batch_window_str:?}: {e}")))?;
        let max_batch_size = env_override(args.max_batch_size, "MAX_BATCH_SIZE")?;
        let debug = env_override(args.debug, "DEBUG_MODE")?;

        if max_batch_size == 0 {
            return Err(AgentError::Config("max-batch-size must be at least 1".into()));
        }

        Ok(Self { port, batching_enabled, batch_window, max_batch_size, debug })
    }
}

/// Overlay an environment variable onto a parsed flag value, parsing it
/// with the same type. A present-but-unparseable env var is a hard
/// configuration error rather than a silently ignored override.
pub fn env_override<T>(flag_value: T, var: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AgentError::Config(format!("invalid {var}={raw:?}: {e}"))),
        Err(_) => Ok(flag_value),
    }
}

/// String-typed variant of [`env_override`] — there's no parse failure mode.
pub fn env_override_string(flag_value: String, var: &str) -> String {
    std::env::var(var).unwrap_or(flag_value)
}

/// Log the effective configuration the way the teacher's startup path does
/// ("print effective configuration").
pub fn log_effective<T: Debug>(name: &str, config: &T) {
    tracing::info!("{name} effective configuration: {config:?}");
}

pub fn warn_on_probe_failure(backend: &str, err: impl std::fmt::Display) {
    warn!("{backend} startup connectivity probe failed (continuing anyway): {err}");
}
