//! Pivots matched sequencing files into one manifest per sample and writes them out.
//!
//! A manifest is a headerless TSV with the columns R1, R2, I1 and I2, one line per lane the
//! sample was sequenced on.  Manifests are staged under `<output-dir>/manifests/` and then copied
//! to their destination prefix.
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use ahash::AHashMap;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use itertools::Itertools;
use log::{debug, info};
use thiserror::Error;

use crate::{
    classify::{sample_stem, LibraryType, ReadType},
    reconcile::MatchedRecord,
    review::{FlagKind, ReviewReport},
    utils::{copy_to_destination, join_location, local_path, sanitize_file_name},
};

/// The sub-directory of the output directory manifests are staged in.
pub const MANIFESTS_DIR_NAME: &str = "manifests";

/// The error that may occur when writing manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Samples '{first}' and '{second}' would both be written to {destination}")]
    DestinationCollision { destination: String, first: String, second: String },

    #[error("Unable to write manifest {}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Unable to write manifest {}", .path.display())]
    Io { path: PathBuf, source: std::io::Error },
}

/// The sequencing files of one sample on one lane.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestLine {
    pub lane: String,
    pub r1: Option<String>,
    pub r2: Option<String>,
    pub i1: Option<String>,
    pub i2: Option<String>,
}

impl ManifestLine {
    pub fn new(lane: &str) -> Self {
        Self { lane: lane.to_string(), ..Self::default() }
    }

    fn slot(&mut self, read_type: ReadType) -> Option<&mut Option<String>> {
        match read_type {
            ReadType::R1 => Some(&mut self.r1),
            ReadType::R2 => Some(&mut self.r2),
            ReadType::I1 => Some(&mut self.i1),
            ReadType::I2 => Some(&mut self.i2),
            ReadType::Unknown => None,
        }
    }

    /// The manifest columns in order, empty when a read type has no file.
    pub fn columns(&self) -> [&str; 4] {
        [&self.r1, &self.r2, &self.i1, &self.i2].map(|c| c.as_deref().unwrap_or(""))
    }
}

/// The manifest of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleManifest {
    pub sample_name: String,
    pub library_type: LibraryType,
    pub sample_stem: String,
    /// One line per lane, ordered by lane.
    pub lines: Vec<ManifestLine>,
}

impl SampleManifest {
    /// The file name the manifest is written to.
    pub fn file_name(&self) -> String {
        format!("{}.tsv", sanitize_file_name(&self.sample_name))
    }
}

/// Orders lanes numerically, falling back to text for anything that is not a number.
fn lane_order(lane: &str) -> (usize, &str) {
    (lane.parse::<usize>().unwrap_or(usize::MAX), lane)
}

type LaneFiles<'a> = BTreeMap<ReadType, BTreeSet<&'a str>>;

/// Builds one manifest per matched sample name, ordered by sample name.
///
/// Anomalies are flagged rather than resolved: files with no read type are left out of the
/// manifest, duplicate files for one slot keep the lexicographically first path, empty slots stay
/// empty, and samples with no known library type are kept but will not be written.
pub fn build_manifests(
    matched: &[MatchedRecord],
    report: &mut ReviewReport,
) -> Vec<SampleManifest> {
    let mut by_sample: BTreeMap<&str, BTreeMap<(usize, &str), LaneFiles>> = BTreeMap::new();
    for m in matched {
        by_sample
            .entry(m.index.sample_name.as_str())
            .or_default()
            .entry(lane_order(&m.index.lane))
            .or_default()
            .entry(m.fastq.read_type())
            .or_default()
            .insert(m.fastq.path.as_str());
    }

    let manifests = by_sample
        .into_iter()
        .map(|(sample_name, lanes)| build_manifest(sample_name, lanes, report))
        .collect_vec();
    info!("Built {} sample manifests", manifests.len());
    manifests
}

fn build_manifest(
    sample_name: &str,
    lanes: BTreeMap<(usize, &str), LaneFiles>,
    report: &mut ReviewReport,
) -> SampleManifest {
    let library_type = LibraryType::from_sample_name(sample_name);
    if !library_type.is_known() {
        report.flag(
            FlagKind::UnclassifiedLibrary,
            sample_name,
            "the sample name has no library type marker, its manifest will not be written",
        );
    }

    let mut lines = Vec::with_capacity(lanes.len());
    for ((_, lane), mut files) in lanes {
        for path in files.remove(&ReadType::Unknown).unwrap_or_default() {
            report.flag(
                FlagKind::UnknownReadType,
                path,
                format!("matched {} on lane {} but has no read type marker", sample_name, lane),
            );
        }

        let mut line = ManifestLine::new(lane);
        for read_type in ReadType::MANIFEST_COLUMNS {
            let mut paths = files.remove(&read_type).unwrap_or_default().into_iter();
            match paths.next() {
                None => report.flag(
                    FlagKind::MissingReadType,
                    sample_name,
                    format!("lane {} has no {} file", lane, read_type),
                ),
                Some(first) => {
                    let ignored = paths.join(", ");
                    if !ignored.is_empty() {
                        report.flag(
                            FlagKind::DuplicateReadType,
                            sample_name,
                            format!(
                                "lane {} has more than one {} file, kept {} and ignored {}",
                                lane, read_type, first, ignored
                            ),
                        );
                    }
                    if let Some(slot) = line.slot(read_type) {
                        *slot = Some(first.to_string());
                    }
                }
            }
        }
        lines.push(line);
    }

    SampleManifest {
        sample_name: sample_name.to_string(),
        library_type,
        sample_stem: sample_stem(sample_name),
        lines,
    }
}

/// An alternate destination prefix for samples whose name contains a marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateDestination {
    pub prefix: String,
    pub marker: String,
}

/// Where manifests are copied to once staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDestinations {
    pub prefix: String,
    pub alternate: Option<AlternateDestination>,
}

impl ManifestDestinations {
    /// The destination of the given manifest.
    pub fn destination_of(&self, manifest: &SampleManifest) -> String {
        let prefix = match &self.alternate {
            Some(alt) if manifest.sample_name.contains(&alt.marker) => &alt.prefix,
            _ => &self.prefix,
        };
        join_location(prefix, &manifest.file_name())
    }
}

/// A manifest that has been staged and copied to its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenManifest {
    pub sample_name: String,
    pub sample_stem: String,
    pub library_type: LibraryType,
    pub destination: String,
}

/// Where one manifest is staged and copied to.
#[derive(Debug)]
struct Placement<'a> {
    manifest: &'a SampleManifest,
    staged: PathBuf,
    destination: String,
}

/// Stages manifests in the output directory and copies them to their destinations.
#[derive(Debug, Clone)]
pub struct ManifestWriter {
    staging_dir: PathBuf,
    destinations: ManifestDestinations,
}

impl ManifestWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P, destinations: ManifestDestinations) -> Self {
        Self { staging_dir: output_dir.as_ref().join(MANIFESTS_DIR_NAME), destinations }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Places every manifest with a known library type, failing if two samples would share a
    /// staged file or a destination.
    fn place<'a>(
        &self,
        manifests: &'a [SampleManifest],
    ) -> Result<Vec<Placement<'a>>, ManifestError> {
        let mut claimed: AHashMap<String, &str> = AHashMap::new();
        let mut placements = vec![];
        for manifest in manifests.iter().filter(|m| m.library_type.is_known()) {
            let staged = self.staging_dir.join(manifest.file_name());
            let destination = self.destinations.destination_of(manifest);
            let locations = [staged.to_string_lossy().to_string(), destination.clone()];
            for location in locations.into_iter().unique() {
                if let Some(first) = claimed.insert(location.clone(), &manifest.sample_name) {
                    return Err(ManifestError::DestinationCollision {
                        destination: location,
                        first: first.to_string(),
                        second: manifest.sample_name.clone(),
                    });
                }
            }
            placements.push(Placement { manifest, staged, destination });
        }
        Ok(placements)
    }

    /// Writes every manifest with a known library type.  All destinations are checked before
    /// anything is written.
    pub fn write(&self, manifests: &[SampleManifest]) -> Result<Vec<WrittenManifest>> {
        let placements = self.place(manifests)?;
        let targets: Vec<PathBuf> =
            placements.iter().map(|p| local_path(&p.destination)).collect::<Result<_>>()?;

        std::fs::create_dir_all(&self.staging_dir).with_context(|| {
            format!("Unable to create directory: {}", self.staging_dir.to_string_lossy())
        })?;

        let mut written = Vec::with_capacity(placements.len());
        for (placement, target) in placements.iter().zip(targets.iter()) {
            write_manifest_file(placement.manifest, &placement.staged)?;
            copy_to_destination(&placement.staged, target)?;
            debug!(
                "Wrote manifest for {} to {}",
                placement.manifest.sample_name, placement.destination
            );
            written.push(WrittenManifest {
                sample_name: placement.manifest.sample_name.clone(),
                sample_stem: placement.manifest.sample_stem.clone(),
                library_type: placement.manifest.library_type,
                destination: placement.destination.clone(),
            });
        }
        info!(
            "Wrote {} manifests to {}, skipped {} with no library type",
            written.len(),
            self.destinations.prefix,
            manifests.len() - written.len()
        );
        Ok(written)
    }
}

/// Writes the manifest as a headerless TSV, one line per lane.
fn write_manifest_file(manifest: &SampleManifest, path: &Path) -> Result<(), ManifestError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|source| ManifestError::Csv { path: path.to_path_buf(), source })?;
    for line in &manifest.lines {
        writer
            .write_record(line.columns())
            .map_err(|source| ManifestError::Csv { path: path.to_path_buf(), source })?;
    }
    writer.flush().map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}
