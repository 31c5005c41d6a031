//! Patches as hot-reloadable code units.
//!
//! [`FilePatchLoader`] reads and parses the patch in `prepare`, while audio is
//! still running, and hands the parsed [`Patch`] over as a [`PatchUnit`] in
//! `load`. Source changes are detected by modification time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use kiln_core::{BuildError, CodeUnit, GraphBuilder, UnitError, UnitLoader};

use crate::patch::Patch;
use crate::registry::OperatorRegistry;

/// A parsed patch bound to the registry that instantiates its operators.
pub struct PatchUnit {
    patch: Patch,
    registry: Arc<OperatorRegistry>,
}

impl PatchUnit {
    /// Bind `patch` to `registry`.
    pub fn new(patch: Patch, registry: Arc<OperatorRegistry>) -> Self {
        Self { patch, registry }
    }

    /// The patch this unit builds.
    pub fn patch(&self) -> &Patch {
        &self.patch
    }
}

impl CodeUnit for PatchUnit {
    fn build(&self, graph: &mut GraphBuilder) -> Result<(), BuildError> {
        self.patch.build(&self.registry, graph)?;
        Ok(())
    }
}

/// Loads a patch file, reloading when its modification time changes.
pub struct FilePatchLoader {
    path: PathBuf,
    registry: Arc<OperatorRegistry>,
    prepared: Option<Patch>,
    seen: Option<SystemTime>,
}

impl FilePatchLoader {
    /// Loader for the patch at `path`.
    pub fn new(path: impl Into<PathBuf>, registry: Arc<OperatorRegistry>) -> Self {
        Self {
            path: path.into(),
            registry,
            prepared: None,
            seen: None,
        }
    }

    /// Path of the patch file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
    }
}

impl UnitLoader for FilePatchLoader {
    fn prepare(&mut self) -> Result<(), UnitError> {
        // Recorded before parsing so a broken file is not retried until it
        // changes again.
        self.seen = self.modified();
        self.prepared = None;
        let patch = Patch::load(&self.path)?;
        tracing::debug!(path = %self.path.display(), operators = patch.len(), "patch prepared");
        self.prepared = Some(patch);
        Ok(())
    }

    fn load(&mut self) -> Result<Box<dyn CodeUnit>, UnitError> {
        let patch = match self.prepared.take() {
            Some(patch) => patch,
            None => Patch::load(&self.path)?,
        };
        Ok(Box::new(PatchUnit::new(patch, Arc::clone(&self.registry))))
    }

    fn needs_reload(&mut self) -> bool {
        match self.modified() {
            Some(modified) => self.seen != Some(modified),
            None => false,
        }
    }
}
