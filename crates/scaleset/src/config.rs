use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::error::ScaleSetError;
use crate::common::timeutils::format_duration;
use crate::gateway::CallLimits;

/// How long is scale-up of a pool blocked after the provider reported exhausted quota.
pub const DEFAULT_QUOTA_COOLDOWN: Duration = Duration::from_secs(15 * 60);
/// Maximum duration of a single gateway request.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Maximum number of per-pool gateway requests in flight.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub quota_cooldown: Duration,
    pub call_timeout: Duration,
    pub max_concurrent_calls: usize,
    /// Spread capacity evenly over all pools of a virtual scale set instead of putting all of it
    /// into the first pool.
    pub slow_scale: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            quota_cooldown: DEFAULT_QUOTA_COOLDOWN,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_concurrent_calls: DEFAULT_MAX_CONCURRENT_CALLS,
            slow_scale: false,
        }
    }
}

impl ReconcilerConfig {
    /// Loads the configuration from environment variables, using defaults for missing or invalid
    /// values.
    pub fn from_env() -> Self {
        let config = Self::from_lookup(|key| std::env::var(key).ok());
        log::debug!(
            "Reconciler configuration: quota cooldown {}, call timeout {}, {} concurrent call(s), slow scale: {}",
            format_duration(config.quota_cooldown),
            format_duration(config.call_timeout),
            config.max_concurrent_calls,
            config.slow_scale
        );
        config
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        Self {
            quota_cooldown: get_duration(&lookup, "SCALESET_QUOTA_COOLDOWN_MS")
                .unwrap_or(DEFAULT_QUOTA_COOLDOWN),
            call_timeout: get_duration(&lookup, "SCALESET_CALL_TIMEOUT_MS")
                .filter(|timeout| !timeout.is_zero())
                .unwrap_or(DEFAULT_CALL_TIMEOUT),
            max_concurrent_calls: get_value(&lookup, "SCALESET_MAX_CONCURRENT_CALLS")
                .and_then(|value| value.parse::<usize>().ok())
                .filter(|count| *count > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT_CALLS),
            slow_scale: get_value(&lookup, "SCALESET_SLOW_SCALE")
                .and_then(|value| parse_flag(&value))
                .unwrap_or(false),
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.call_timeout.is_zero() {
            return Err(ScaleSetError::InvalidConfig(
                "gateway call timeout must be positive".to_string(),
            ));
        }
        if self.max_concurrent_calls == 0 {
            return Err(ScaleSetError::InvalidConfig(
                "at least one concurrent gateway call must be allowed".to_string(),
            ));
        }
        Ok(())
    }

    pub fn call_limits(&self) -> CallLimits {
        CallLimits::new(self.call_timeout, self.max_concurrent_calls)
    }
}

fn get_value<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<String> {
    let value = lookup(key)?;
    if value.trim().is_empty() {
        return None;
    }
    Some(value)
}

fn get_duration<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<Duration> {
    let value = get_value(lookup, key)?;
    match value.trim().parse::<u64>() {
        Ok(millis) => Some(Duration::from_millis(millis)),
        Err(error) => {
            log::warn!("Ignoring invalid value {value:?} of {key}: {error}");
            None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
