//! Name-keyed state migration across reloads.
//!
//! Immediately before a reload, [`StateSnapshot::capture`] asks every operator
//! in both domains to export its opaque state. After the new unit's build
//! function returns, and before the first cook, [`StateSnapshot::restore`]
//! hands each blob to the new operator of the same name.
//!
//! Matching is by name only. New operators with no entry keep their fresh
//! defaults; entries with no matching operator are discarded. Neither case is
//! an error. Snapshots live in memory for the duration of one reload.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StateError;
use crate::graph::{AudioPlan, Graph};

/// Opaque, operator-defined serialized state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateBlob(Vec<u8>);

impl StateBlob {
    /// A blob carrying no state.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Serialize `value` into a blob.
    ///
    /// Blobs are JSON, which writes NaN and infinite floats as `null`. State
    /// that may hold them should encode `f32::to_bits` instead.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, StateError> {
        serde_json::to_vec(value)
            .map(Self)
            .map_err(StateError::Encode)
    }

    /// Deserialize the blob into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StateError> {
        serde_json::from_slice(&self.0).map_err(StateError::Decode)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the blob carries no state.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Outcome of [`StateSnapshot::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Operators that received their previous state.
    pub restored: Vec<String>,
    /// New operators with no snapshot entry, left at defaults.
    pub fresh: Vec<String>,
    /// Snapshot entries with no operator in the new graph.
    pub discarded: Vec<String>,
    /// Operators whose import failed, left at defaults.
    pub failed: Vec<String>,
}

/// Name-keyed collection of state blobs captured at one instant.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    entries: BTreeMap<String, StateBlob>,
}

impl StateSnapshot {
    /// Empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the state of every operator in `graph` and, if given, `audio`.
    ///
    /// An operator whose export fails is left out of the snapshot, so its
    /// successor starts fresh.
    pub fn capture(graph: &Graph, audio: Option<&AudioPlan>) -> Self {
        let mut snapshot = Self::new();
        for (name, op) in graph.operators() {
            snapshot.record(name, op.export_state());
        }
        if let Some(plan) = audio {
            for (name, op) in plan.operators() {
                snapshot.record(name, op.export_state());
            }
        }
        tracing::debug!(entries = snapshot.len(), "captured state snapshot");
        snapshot
    }

    /// Import matching entries into the operators of a freshly built graph.
    pub fn restore(&self, graph: &mut Graph, audio: Option<&mut AudioPlan>) -> RestoreReport {
        let mut report = RestoreReport::default();
        let mut seen = HashSet::new();

        for (name, op) in graph.operators_mut() {
            seen.insert(name.to_string());
            self.apply(name, |blob| op.import_state(blob), &mut report);
        }
        if let Some(plan) = audio {
            for (name, op) in plan.operators_mut() {
                seen.insert(name.to_string());
                self.apply(name, |blob| op.import_state(blob), &mut report);
            }
        }

        report.discarded = self
            .entries
            .keys()
            .filter(|name| !seen.contains(name.as_str()))
            .cloned()
            .collect();

        tracing::debug!(
            restored = report.restored.len(),
            fresh = report.fresh.len(),
            discarded = report.discarded.len(),
            failed = report.failed.len(),
            "restored state snapshot"
        );
        report
    }

    /// Insert or replace the entry for `name`.
    pub fn insert(&mut self, name: impl Into<String>, blob: StateBlob) {
        self.entries.insert(name.into(), blob);
    }

    /// Entry for `name`.
    pub fn get(&self, name: &str) -> Option<&StateBlob> {
        self.entries.get(name)
    }

    /// Captured operator names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, name: &str, exported: Result<StateBlob, StateError>) {
        match exported {
            Ok(blob) => {
                self.entries.insert(name.to_string(), blob);
            }
            Err(err) => {
                tracing::warn!(operator = name, error = %err, "state export failed");
            }
        }
    }

    fn apply<F>(&self, name: &str, import: F, report: &mut RestoreReport)
    where
        F: FnOnce(&StateBlob) -> Result<(), StateError>,
    {
        match self.entries.get(name) {
            None => report.fresh.push(name.to_string()),
            // Stateless last generation: nothing to hand over.
            Some(blob) if blob.is_empty() => report.restored.push(name.to_string()),
            Some(blob) => match import(blob) {
                Ok(()) => report.restored.push(name.to_string()),
                Err(err) => {
                    tracing::warn!(operator = name, error = %err, "state import failed, keeping defaults");
                    report.failed.push(name.to_string());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_encodes_and_decodes() {
        let blob = StateBlob::encode(&(3.14f64, vec![1u8, 2, 3])).unwrap();
        assert!(!blob.is_empty());
        let (phase, ring): (f64, Vec<u8>) = blob.decode().unwrap();
        assert_eq!(phase, 3.14);
        assert_eq!(ring, vec![1, 2, 3]);
    }

    #[test]
    fn decoding_garbage_is_an_error() {
        let blob = StateBlob::from_bytes(b"not json".to_vec());
        assert!(matches!(blob.decode::<f64>(), Err(StateError::Decode(_))));
    }

    #[test]
    fn snapshot_insert_and_lookup() {
        let mut snapshot = StateSnapshot::new();
        snapshot.insert("b", StateBlob::empty());
        snapshot.insert("a", StateBlob::encode(&1).unwrap());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(snapshot.get("a").is_some());
        assert!(snapshot.get("c").is_none());
    }
}
