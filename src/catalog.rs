//! The template catalog: `{category: {label: path}}` in a JSON file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    /// `(label, path)` in file order, paths already resolved
    pub entries: Vec<(String, PathBuf)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    categories: Vec<Category>,
}

impl Catalog {
    /// Reads the catalog at `path`, relative reference paths are resolved
    /// against `resource_root`.
    pub fn load(path: impl AsRef<Path>, resource_root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json_str(&text, resource_root)?;
        debug!(
            "loaded {} categories from {}",
            catalog.categories.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn from_json_str(text: &str, resource_root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let resource_root = resource_root.as_ref();
        let root: Map<String, Value> = serde_json::from_str(text)?;

        let mut categories = Vec::with_capacity(root.len());
        for (name, labels) in root {
            let labels: Map<String, Value> = serde_json::from_value(labels)?;
            let mut entries = Vec::with_capacity(labels.len());
            for (label, path) in labels {
                let path: PathBuf = serde_json::from_value(path)?;
                entries.push((label, resource_root.join(path)));
            }
            categories.push(Category { name, entries });
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Resolves a label in the flattened view, later categories shadow earlier ones.
    pub fn resolve(&self, label: &str) -> Option<&Path> {
        self.categories
            .iter()
            .rev()
            .find_map(|c| c.entries.iter().find(|(l, _)| l == label))
            .map(|(_, p)| p.as_path())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.resolve(label).is_some()
    }

    /// Every label once, in order of first appearance.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for (label, _) in self.categories.iter().flat_map(|c| &c.entries) {
            if !labels.contains(&label.as_str()) {
                labels.push(label);
            }
        }
        labels
    }
}
