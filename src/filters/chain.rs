// SPDX-License-Identifier: GPL-3.0-only

//! Ordered filter selection
//!
//! A [`FilterChain`] is the list the UI shows: one entry per kernel in
//! discovery order, each with an enabled flag. The executor reads it as a
//! snapshot and runs the enabled entries in order.

use super::registry::KernelDescriptor;
use std::sync::Arc;

/// Anything a chain entry can refer to by name
pub trait Kernel {
    fn name(&self) -> &str;
}

impl Kernel for KernelDescriptor {
    fn name(&self) -> &str {
        KernelDescriptor::name(self)
    }
}

impl<K: Kernel + ?Sized> Kernel for Arc<K> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Debug, Clone)]
pub struct FilterEntry<K = Arc<KernelDescriptor>> {
    pub kernel: K,
    pub enabled: bool,
}

impl<K: Kernel> FilterEntry<K> {
    pub fn name(&self) -> &str {
        self.kernel.name()
    }
}

#[derive(Debug, Clone)]
pub struct FilterChain<K = Arc<KernelDescriptor>> {
    entries: Vec<FilterEntry<K>>,
}

impl<K> Default for FilterChain<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Kernel> FilterChain<K> {
    /// One disabled entry per kernel, in the given order
    pub fn from_kernels(kernels: impl IntoIterator<Item = K>) -> Self {
        Self {
            entries: kernels
                .into_iter()
                .map(|kernel| FilterEntry {
                    kernel,
                    enabled: false,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[FilterEntry<K>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterEntry<K>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set an entry's flag. Returns false if no entry has that name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.name() == name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Flip an entry's flag and return the new value
    pub fn toggle(&mut self, name: &str) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|e| e.name() == name)?;
        entry.enabled = !entry.enabled;
        Some(entry.enabled)
    }

    pub fn set_all(&mut self, enabled: bool) {
        for entry in &mut self.entries {
            entry.enabled = enabled;
        }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.enabled && e.name() == name)
    }

    /// Move the entry at `from` to position `to`, shifting the ones between
    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        if from >= self.entries.len() || to >= self.entries.len() {
            return false;
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        true
    }

    /// Enabled kernels in execution order
    pub fn enabled(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().filter(|e| e.enabled).map(|e| &e.kernel)
    }

    pub fn enabled_names(&self) -> Vec<&str> {
        self.enabled().map(|k| k.name()).collect()
    }
}
