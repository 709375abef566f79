//! Publishes the sample sheet: one row per sample stem with the manifest of each library type.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use fgoxide::io::DelimFile;
use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::{
    classify::LibraryType,
    manifest::WrittenManifest,
    review::{FlagKind, ReviewReport},
    utils::copy_to_destination,
};

/// The file name the sample sheet is staged as in the output directory.
pub const SAMPLE_SHEET_FILE_NAME: &str = "sample_sheet.tsv";

/// The error that may occur when publishing the [`PublishedSheet`].
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Unable to write the sample sheet to {}", .path.display())]
    Write { path: PathBuf, source: fgoxide::FgError },

    #[error("The sample sheet destination {} is a directory, expected a file path", .path.display())]
    DestinationIsDirectory { path: PathBuf },
}

/// A row of the published sample sheet.  The serialized column names are fixed by the
/// downstream pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PublishedRow {
    #[serde(rename = "entity:sample_id")]
    pub sample_id: String,
    #[serde(rename = "tsvGEX")]
    pub gex: String,
    #[serde(rename = "tsvVDJ")]
    pub vdj: String,
    #[serde(rename = "tsvABs")]
    pub abs: String,
}

impl PublishedRow {
    fn new(sample_id: &str) -> Self {
        Self { sample_id: sample_id.to_string(), ..Self::default() }
    }

    /// The cell for the given library type, `None` for library types that are not published.
    fn cell(&mut self, library_type: LibraryType) -> Option<&mut String> {
        match library_type {
            LibraryType::Gex => Some(&mut self.gex),
            LibraryType::Vdj => Some(&mut self.vdj),
            LibraryType::CiteSeq => Some(&mut self.abs),
            LibraryType::Bcr | LibraryType::Unknown => None,
        }
    }

    /// True if no library column has a manifest.
    pub fn is_empty(&self) -> bool {
        self.gex.is_empty() && self.vdj.is_empty() && self.abs.is_empty()
    }
}

/// The sample sheet, with rows ordered by sample stem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishedSheet {
    pub rows: Vec<PublishedRow>,
}

impl PublishedSheet {
    /// Pivots the written manifests into one row per sample stem.
    ///
    /// When more than one manifest of a library type shares a stem the first is kept.  Rows are
    /// never dropped, even when empty; every such case is flagged on the given report instead.
    pub fn from_manifests(manifests: &[WrittenManifest], report: &mut ReviewReport) -> Self {
        let mut by_stem: BTreeMap<&str, PublishedRow> = BTreeMap::new();
        for manifest in manifests {
            let stem = manifest.sample_stem.as_str();
            let row = by_stem.entry(stem).or_insert_with(|| PublishedRow::new(stem));
            match row.cell(manifest.library_type) {
                None => report.flag(
                    FlagKind::UnpublishedLibrary,
                    stem,
                    format!(
                        "{} is a {} library, which has no column in the sample sheet",
                        manifest.sample_name, manifest.library_type
                    ),
                ),
                Some(cell) if !cell.is_empty() => report.flag(
                    FlagKind::DuplicateLibrary,
                    stem,
                    format!(
                        "{} is another {} library, kept {} and ignored {}",
                        manifest.sample_name, manifest.library_type, cell, manifest.destination
                    ),
                ),
                Some(cell) => *cell = manifest.destination.clone(),
            }
        }

        for row in by_stem.values().filter(|r| r.is_empty()) {
            report.flag(FlagKind::EmptySheetRow, row.sample_id.as_str(), "no published manifests");
        }

        Self { rows: by_stem.into_values().collect() }
    }

    /// Writes the sheet to `sample_sheet.tsv` in the output directory and, if given, copies it to
    /// the destination, overwriting any existing file.  Returns the path of the staged sheet.
    pub fn publish(&self, output_dir: &Path, destination: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = destination {
            if path.is_dir() {
                return Err(PublishError::DestinationIsDirectory { path: path.to_path_buf() }.into());
            }
        }

        let staged = output_dir.join(SAMPLE_SHEET_FILE_NAME);
        let delim = DelimFile::default();
        delim
            .write_tsv(&staged, self.rows.iter())
            .map_err(|source| PublishError::Write { path: staged.clone(), source })?;
        info!("Wrote sample sheet with {} rows to {}", self.rows.len(), staged.to_string_lossy());

        if let Some(path) = destination {
            copy_to_destination(&staged, path)?;
            info!("Published sample sheet to {}", path.to_string_lossy());
        }
        Ok(staged)
    }
}
