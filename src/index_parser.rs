//! Index page parsing
//!
//! The webcam index is a set of Bootstrap tables in which a row of place
//! names is followed by a row of thumbnails. Only tables carrying exactly the
//! `table table-striped table-bordered` classes hold cameras.

use crate::{CameraCatalog, CameraEntry, HarvestError};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

const CAMERA_TABLE_CLASSES: [&str; 3] = ["table", "table-striped", "table-bordered"];

pub struct IndexParser {
    table: Selector,
    row: Selector,
    cell: Selector,
    image: Selector,
}

impl IndexParser {
    pub fn new() -> Result<Self, HarvestError> {
        Ok(Self {
            table: parse_selector("table")?,
            row: parse_selector("tr")?,
            cell: parse_selector("td")?,
            image: parse_selector("img")?,
        })
    }

    /// Build the catalog from index markup. Relative `src` attributes are
    /// resolved against `base`.
    pub fn parse(&self, html: &str, base: &Url) -> CameraCatalog {
        let document = Html::parse_document(html);
        let mut entries: Vec<CameraEntry> = Vec::new();

        for table in document.select(&self.table) {
            if !is_camera_table(&table) {
                continue;
            }

            // Positions appended by the most recent header row, waiting for
            // their data row.
            let mut pending: Option<std::ops::Range<usize>> = None;

            for row in table.select(&self.row) {
                match pending.take() {
                    None => {
                        let start = entries.len();
                        for cell in row.select(&self.cell) {
                            let position = entries.len();
                            entries.push(CameraEntry {
                                position,
                                display_name: cell_text(&cell),
                                image_url: None,
                            });
                        }
                        pending = Some(start..entries.len());
                    }
                    Some(headers) => {
                        let cells = row.select(&self.cell);
                        for (position, cell) in headers.zip(cells) {
                            entries[position].image_url = self.cell_image(&cell, base);
                        }
                    }
                }
            }
        }

        let catalog = CameraCatalog::from_entries(entries);
        info!(
            cameras = catalog.len(),
            with_images = catalog.with_url_count(),
            "Parsed webcam index"
        );
        catalog
    }

    fn cell_image(&self, cell: &ElementRef<'_>, base: &Url) -> Option<String> {
        let src = cell
            .select(&self.image)
            .next()?
            .value()
            .attr("src")
            .map(str::trim)
            .filter(|src| !src.is_empty())?;

        match base.join(src) {
            Ok(resolved) => Some(resolved.to_string()),
            Err(e) => {
                debug!(%src, error = %e, "Unresolvable image src");
                None
            }
        }
    }
}

fn parse_selector(css: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css)
        .map_err(|e| HarvestError::ConfigurationError(format!("selector {css}: {e}")))
}

fn is_camera_table(table: &ElementRef<'_>) -> bool {
    let classes: HashSet<&str> = table.value().classes().collect();
    classes.len() == CAMERA_TABLE_CLASSES.len()
        && CAMERA_TABLE_CLASSES.iter().all(|c| classes.contains(c))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}
