//! Camera selection
//!
//! Users pick cameras by display name or by catalog position. Display names
//! can repeat, so a name may select several cameras; a position always
//! selects at most one.

use crate::{CameraCatalog, FetchTask};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// A single name or position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SelectorItem {
    Index(usize),
    Name(String),
}

impl SelectorItem {
    /// All-digit tokens are positions, anything else is a display name.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse() {
                return SelectorItem::Index(index);
            }
        }
        SelectorItem::Name(token.to_string())
    }

    fn resolve(&self, catalog: &CameraCatalog, matched: &mut BTreeSet<usize>) {
        match self {
            SelectorItem::Index(index) => {
                if catalog.get(*index).is_some() {
                    matched.insert(*index);
                } else {
                    warn!(index, cameras = catalog.len(), "Camera index out of range");
                }
            }
            SelectorItem::Name(name) => {
                let mut found = false;
                for entry in catalog.find_by_name(name) {
                    matched.insert(entry.position);
                    found = true;
                }
                if !found {
                    warn!(%name, "No camera with this name");
                }
            }
        }
    }
}

/// Typed selector accepted by `--only`/`--exclude` and the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CameraSelector {
    Index(usize),
    Name(String),
    List(Vec<SelectorItem>),
}

impl CameraSelector {
    /// Build a selector from raw command-line tokens. Returns `None` when no
    /// token was given.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Option<Self> {
        let mut items: Vec<SelectorItem> = tokens
            .iter()
            .map(|t| SelectorItem::parse(t.as_ref()))
            .collect();

        match items.len() {
            0 => None,
            1 => Some(match items.remove(0) {
                SelectorItem::Index(index) => CameraSelector::Index(index),
                SelectorItem::Name(name) => CameraSelector::Name(name),
            }),
            _ => Some(CameraSelector::List(items)),
        }
    }

    /// Catalog positions this selector matches.
    pub fn resolve(&self, catalog: &CameraCatalog) -> BTreeSet<usize> {
        let mut matched = BTreeSet::new();
        match self {
            CameraSelector::Index(index) => {
                SelectorItem::Index(*index).resolve(catalog, &mut matched)
            }
            CameraSelector::Name(name) => {
                SelectorItem::Name(name.clone()).resolve(catalog, &mut matched)
            }
            CameraSelector::List(items) => {
                for item in items {
                    item.resolve(catalog, &mut matched);
                }
            }
        }
        matched
    }
}

/// Turn the catalog into fetch tasks, honouring include then exclude.
///
/// Entries without an image URL never produce a task. Tasks keep catalog
/// order.
pub fn select_tasks(
    catalog: &CameraCatalog,
    include: Option<&CameraSelector>,
    exclude: Option<&CameraSelector>,
) -> Vec<FetchTask> {
    let mut working: BTreeSet<usize> = match include {
        Some(selector) => selector.resolve(catalog),
        None => (0..catalog.len()).collect(),
    };

    if let Some(selector) = exclude {
        for position in selector.resolve(catalog) {
            working.remove(&position);
        }
    }

    working
        .into_iter()
        .filter_map(|position| catalog.get(position))
        .filter_map(FetchTask::from_entry)
        .collect()
}
