//! State snapshots managed by the stores in this crate
//!
//! A [`StateSnapshot`] is the complete managed state at a point in time.
//! Stores hand out copies of it; nothing outside a store mutates the
//! snapshot it holds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub mod codec;

pub use codec::{decode, encode};

/// Format version written by this crate
pub const STATE_VERSION: u32 = 3;

/// Type alias for the managed values of a snapshot
pub type StateValues = BTreeMap<String, Value>;

/// Complete managed state at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Snapshot format version
    pub version: u32,

    /// Write counter, bumped whenever the contents change
    #[serde(default)]
    pub serial: u64,

    /// Identifies the history this snapshot belongs to
    pub lineage: String,

    /// The managed values
    #[serde(default)]
    pub values: StateValues,
}

impl StateSnapshot {
    /// Create an empty snapshot with a fresh lineage
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            lineage: Uuid::new_v4().to_string(),
            values: StateValues::new(),
        }
    }

    /// Builder-style setter
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Get a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Remove a value, returning it if present
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Whether the snapshot manages no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compare everything except the serial
    pub fn same_contents(&self, other: &StateSnapshot) -> bool {
        self.version == other.version
            && self.lineage == other.lineage
            && self.values == other.values
    }

    /// Bump the serial if this snapshot differs from `other`.
    ///
    /// Nothing happens when `other` is absent or when this snapshot's serial
    /// is already ahead of it.
    pub fn increment_serial_maybe(&mut self, other: Option<&StateSnapshot>) {
        let Some(other) = other else {
            return;
        };

        if self.serial > other.serial {
            return;
        }

        if !self.same_contents(other) {
            self.serial = self.serial.max(other.serial) + 1;
        }
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
