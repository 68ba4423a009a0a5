//! The active set of reference images and its cross-thread publication.
//!
//! A [`TemplateSet`] is never edited in place. The selection side builds a new
//! one and [`TemplateStore::publish`]es it, the matching loop takes a snapshot
//! with [`TemplateStore::read`] once per cycle.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use arc_swap::ArcSwap;

/// An ordered label -> reference image path mapping with unique labels.
///
/// Iteration order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet {
    entries: Vec<(String, PathBuf)>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from `(label, path)` pairs, a repeated label keeps its
    /// first position and path.
    pub fn from_entries<L, P>(entries: impl IntoIterator<Item = (L, P)>) -> Self
    where
        L: Into<String>,
        P: Into<PathBuf>,
    {
        let mut set = Self::new();
        for (label, path) in entries {
            let label = label.into();
            if set.get(&label).is_none() {
                set.entries.push((label, path.into()));
            }
        }
        set
    }

    pub fn get(&self, label: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| p.as_path())
    }

    pub fn entries(&self) -> &[(String, PathBuf)] {
        &self.entries
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Holds the currently active [`TemplateSet`].
///
/// Publishing swaps the whole `Arc`, so readers never see a mix of two sets.
/// Neither side takes a lock.
#[derive(Debug, Default)]
pub struct TemplateStore {
    current: ArcSwap<TemplateSet>,
    changed: AtomicBool,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active set and raises the "changed" flag.
    pub fn publish(&self, set: TemplateSet) {
        self.current.store(Arc::new(set));
        self.changed.store(true, Ordering::Release);
    }

    /// The latest published set.
    pub fn read(&self) -> Arc<TemplateSet> {
        self.current.load_full()
    }

    /// Whether anything was published since the last call, clears the flag.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }
}
