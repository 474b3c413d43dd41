//! Ownership bookkeeping for factories.
//!
//! A factory is usable only while at least one loader context owns it. The
//! tracker records those owners together with the path of the library the
//! factory came from. It knows nothing about the plugin interface.
//!
//! Every accessor takes the tracker's own lock for the duration of a short,
//! I/O-free critical section, so a factory can be shared across loader and
//! consumer threads behind an `Arc`.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::UNKNOWN_LIBRARY_PATH;

/// Opaque identity of one library loading session.
///
/// Ids are random and never reused, so a stale id left behind by a destroyed
/// loader cannot alias a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoaderId(Uuid);

impl LoaderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LoaderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader-{}", self.0)
    }
}

/// Lifecycle state derived from the owner set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactoryState {
    /// At least one loader owns the factory.
    Active,
    /// No loader owns the factory; it must not be used.
    Orphaned,
}

impl FactoryState {
    pub fn is_active(&self) -> bool {
        matches!(self, FactoryState::Active)
    }
}

#[derive(Debug)]
struct TrackerState {
    owners: Vec<LoaderId>,
    library_path: String,
}

/// Set of owning loaders plus the originating library path.
pub struct OwnershipTracker {
    state: Mutex<TrackerState>,
}

impl OwnershipTracker {
    /// Create a tracker with no owners and an unknown library path.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                owners: Vec::new(),
                library_path: UNKNOWN_LIBRARY_PATH.to_string(),
            }),
        }
    }

    /// Path of the library this factory was produced from, or
    /// [`UNKNOWN_LIBRARY_PATH`] if the loader has not recorded it yet.
    pub fn library_path(&self) -> String {
        self.state.lock().library_path.clone()
    }

    /// Record the originating library. The path is opaque; existence is the
    /// loader's concern.
    pub fn set_library_path(&self, path: impl Into<String>) {
        self.state.lock().library_path = path.into();
    }

    /// Record the originating library and return the path it replaced, under
    /// one lock acquisition.
    pub fn replace_library_path(&self, path: impl Into<String>) -> String {
        std::mem::replace(&mut self.state.lock().library_path, path.into())
    }

    /// Whether a library path other than the sentinel has been recorded.
    pub fn has_library_path(&self) -> bool {
        self.state.lock().library_path != UNKNOWN_LIBRARY_PATH
    }

    /// Add `owner` unless already present. Returns `true` if the set changed.
    pub fn add_owner(&self, owner: LoaderId) -> bool {
        let mut state = self.state.lock();
        if state.owners.contains(&owner) {
            return false;
        }
        state.owners.push(owner);
        true
    }

    /// Remove `owner` if present. Returns `true` if the set changed.
    pub fn remove_owner(&self, owner: LoaderId) -> bool {
        let mut state = self.state.lock();
        match state.owners.iter().position(|o| *o == owner) {
            Some(index) => {
                state.owners.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_owned_by(&self, owner: LoaderId) -> bool {
        self.state.lock().owners.contains(&owner)
    }

    /// `false` means the factory is stale and its library may be unloaded.
    pub fn has_any_owner(&self) -> bool {
        !self.state.lock().owners.is_empty()
    }

    pub fn owner_count(&self) -> usize {
        self.state.lock().owners.len()
    }

    /// Snapshot of the current owners.
    pub fn owners(&self) -> Vec<LoaderId> {
        self.state.lock().owners.clone()
    }

    pub fn state(&self) -> FactoryState {
        if self.has_any_owner() {
            FactoryState::Active
        } else {
            FactoryState::Orphaned
        }
    }
}

impl Default for OwnershipTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OwnershipTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OwnershipTracker")
            .field("owners", &state.owners)
            .field("library_path", &state.library_path)
            .finish()
    }
}
