//! Camera catalog parsed from one fetch of the index page

use serde::Serialize;

/// One camera cell of the index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraEntry {
    /// 0-based, dense, in document order
    pub position: usize,
    pub display_name: String,
    /// Absent when the image cell did not resolve to a usable `src`
    pub image_url: Option<String>,
}

impl CameraEntry {
    /// `{position:03}.{display_name}`, which stays distinct when several
    /// cameras share a display name.
    pub fn unique_name(&self) -> String {
        unique_name(self.position, &self.display_name)
    }
}

pub fn unique_name(position: usize, display_name: &str) -> String {
    format!("{position:03}.{display_name}")
}

/// Ordered, immutable list of cameras. Serializes as a plain array of
/// entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CameraCatalog {
    entries: Vec<CameraEntry>,
}

impl CameraCatalog {
    pub(crate) fn from_entries(entries: Vec<CameraEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CameraEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&CameraEntry> {
        self.entries.get(position)
    }

    /// Every entry carrying exactly this display name.
    pub fn find_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CameraEntry> + 'a {
        self.entries.iter().filter(move |e| e.display_name == name)
    }

    pub fn with_url_count(&self) -> usize {
        self.entries.iter().filter(|e| e.image_url.is_some()).count()
    }
}

/// One camera's unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub unique_name: String,
    pub url: String,
}

impl FetchTask {
    pub fn from_entry(entry: &CameraEntry) -> Option<Self> {
        entry.image_url.as_ref().map(|url| Self {
            unique_name: entry.unique_name(),
            url: url.clone(),
        })
    }
}
