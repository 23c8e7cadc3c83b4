// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Label-keyed shell registry.
//!
//! The registry is the sole owner of shell instances; every other party
//! (reader tasks, scheduler, tool handlers) holds the label or a cloned
//! `Arc` and goes through the shell's own mutex for mutation. One lock
//! around the map makes insert/get/remove atomic, so concurrent starts
//! with the same label race safely.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ToolError;
use crate::shell::Shell;

/// A shell shared between the registry, its reader task, and the
/// scheduler.
pub type SharedShell = Arc<Mutex<Shell>>;

#[derive(Default)]
pub struct Registry {
    shells: Mutex<HashMap<String, SharedShell>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shell under its label. Fails when the label is taken.
    pub fn insert(&self, shell: SharedShell) -> Result<(), ToolError> {
        let label = shell.lock().label.clone();
        let mut shells = self.shells.lock();
        if shells.contains_key(&label) {
            return Err(ToolError::duplicate_label(&label));
        }
        shells.insert(label, shell);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Result<SharedShell, ToolError> {
        self.shells
            .lock()
            .get(label)
            .cloned()
            .ok_or_else(|| ToolError::not_found(label))
    }

    pub fn remove(&self, label: &str) -> Option<SharedShell> {
        self.shells.lock().remove(label)
    }

    /// All shells, label-sorted for deterministic listings.
    pub fn list(&self) -> Vec<SharedShell> {
        let shells = self.shells.lock();
        let mut entries: Vec<_> = shells.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, shell)| Arc::clone(shell)).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<_> = self.shells.lock().keys().cloned().collect();
        labels.sort();
        labels
    }

    pub fn len(&self) -> usize {
        self.shells.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
