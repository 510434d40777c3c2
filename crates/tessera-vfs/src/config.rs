//! Watcher configuration.
//!
//! The notify-backed watcher uses two bounded queues: the notify callback feeds a raw queue that a
//! drain thread normalizes into the events queue read by consumers. When either queue overflows
//! the watcher drops events and emits [`crate::WatchEvent::Rescan`].
//!
//! Capacities can be set from a host config file (the struct is `Deserialize`) or through the
//! environment:
//!
//! - `TESSERA_WATCH_NOTIFY_RAW_QUEUE_CAPACITY`
//! - `TESSERA_WATCH_NOTIFY_EVENTS_QUEUE_CAPACITY`

use std::io;

use serde::Deserialize;

pub const ENV_RAW_QUEUE_CAPACITY: &str = "TESSERA_WATCH_NOTIFY_RAW_QUEUE_CAPACITY";
pub const ENV_EVENTS_QUEUE_CAPACITY: &str = "TESSERA_WATCH_NOTIFY_EVENTS_QUEUE_CAPACITY";

const DEFAULT_RAW_QUEUE_CAPACITY: usize = 4096;
const DEFAULT_EVENTS_QUEUE_CAPACITY: usize = 1024;
const MAX_QUEUE_CAPACITY: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchConfig {
    pub raw_queue_capacity: usize,
    pub events_queue_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            raw_queue_capacity: DEFAULT_RAW_QUEUE_CAPACITY,
            events_queue_capacity: DEFAULT_EVENTS_QUEUE_CAPACITY,
        }
    }
}

impl WatchConfig {
    /// Defaults overridden by any capacity set in the environment.
    pub fn from_env() -> io::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            raw_queue_capacity: queue_capacity_from_env(ENV_RAW_QUEUE_CAPACITY)?
                .unwrap_or(defaults.raw_queue_capacity),
            events_queue_capacity: queue_capacity_from_env(ENV_EVENTS_QUEUE_CAPACITY)?
                .unwrap_or(defaults.events_queue_capacity),
        })
    }

    /// Clamps both capacities into `1..=1_000_000`.
    pub fn clamped(self) -> Self {
        Self {
            raw_queue_capacity: self.raw_queue_capacity.clamp(1, MAX_QUEUE_CAPACITY),
            events_queue_capacity: self.events_queue_capacity.clamp(1, MAX_QUEUE_CAPACITY),
        }
    }
}

/// Reads a queue capacity from `var`.
///
/// Unset, empty and `0` all mean "use the default" (`Ok(None)`).
pub fn queue_capacity_from_env(var: &str) -> io::Result<Option<usize>> {
    let raw = match std::env::var(var) {
        Ok(value) => value,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(err) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("failed to read env var {var}: {err}"),
            ))
        }
    };
    parse_queue_capacity(var, &raw)
}

fn parse_queue_capacity(var: &str, raw: &str) -> io::Result<Option<usize>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "0" {
        return Ok(None);
    }

    let parsed = raw.parse::<usize>().map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid {var}={raw:?}: {err}"),
        )
    })?;
    Ok(Some(parsed.clamp(1, MAX_QUEUE_CAPACITY)))
}
