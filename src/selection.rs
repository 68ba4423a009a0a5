use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    catalog::Catalog,
    template_set::{TemplateSet, TemplateStore},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("unknown label: {0}")]
    UnknownLabel(String),
}

/// The operator's choice of labels.
///
/// Every toggle rebuilds the [`TemplateSet`] from scratch, in selection order,
/// and publishes it to the [`TemplateStore`].
pub struct Selection {
    catalog: Catalog,
    selected: Vec<String>,
    store: Arc<TemplateStore>,
}

impl Selection {
    pub fn new(catalog: Catalog, store: Arc<TemplateStore>) -> Self {
        Self {
            catalog,
            selected: Vec::new(),
            store,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Selected labels, oldest first.
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn is_selected(&self, label: &str) -> bool {
        self.selected.iter().any(|l| l == label)
    }

    pub fn toggle(&mut self, label: &str, selected: bool) -> Result<(), SelectionError> {
        if !self.catalog.contains(label) {
            return Err(SelectionError::UnknownLabel(label.to_string()));
        }

        if selected {
            if !self.is_selected(label) {
                self.selected.push(label.to_string());
            }
        } else {
            self.selected.retain(|l| l != label);
        }

        let set = self.build();
        info!("active templates: {:?}", set.labels().collect::<Vec<_>>());
        self.store.publish(set);
        Ok(())
    }

    fn build(&self) -> TemplateSet {
        TemplateSet::from_entries(self.selected.iter().filter_map(|label| {
            self.catalog
                .resolve(label)
                .map(|path| (label.as_str(), path.to_path_buf()))
        }))
    }
}
