//! Shared timeout configuration.
//!
//! Read/write timeouts are process-wide tunables: one value pair, visible
//! to every open session. The context owns a [`SharedTimeouts`] and clones
//! it into each session it creates, so `set_timeouts` takes effect on the
//! next operation of every session.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Read and write timeouts in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub read_ms: u64,
    pub write_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read_ms: 1000,
            write_ms: 1000,
        }
    }
}

impl Timeouts {
    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }

    /// Load timeouts from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save timeouts to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Format(#[from] toml::ser::Error),
}

/// Handle on the process-wide timeout pair.
///
/// Cloning shares the underlying value; the lock is held only long enough
/// to copy the pair in or out.
#[derive(Debug, Clone, Default)]
pub struct SharedTimeouts(Arc<Mutex<Timeouts>>);

impl SharedTimeouts {
    pub fn new(timeouts: Timeouts) -> Self {
        Self(Arc::new(Mutex::new(timeouts)))
    }

    pub fn get(&self) -> Timeouts {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, timeouts: Timeouts) {
        *self.0.lock().unwrap() = timeouts;
    }
}
