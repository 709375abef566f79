//! Discovers sequencing output files and infers their index pair and lane from the file name.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bstr::{BStr, BString, ByteSlice};
use fgoxide::io::Io;
use itertools::Itertools;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::Serialize;

use crate::{classify::ReadType, utils::file_name_of};

/// The suffix of sequencing output files when none is given.
pub static DEFAULT_FASTQ_SUFFIX: &str = ".fastq.gz";

/// The number of bases in each index of the file name index pair.
pub const INDEX_LENGTH: usize = 10;

lazy_static! {
    /// <index1>_<index2>, each exactly `INDEX_LENGTH` bases and not part of a longer run of bases
    static ref INDEX_PAIR_REGEX: Regex = Regex::new(&format!(
        r"(?:^|[^ACGT])([ACGT]{{{n}}})_([ACGT]{{{n}}})(?:[^ACGT]|$)",
        n = INDEX_LENGTH
    ))
    .unwrap();
}

/// A sequencing output file and the values inferred from its name.  Any value that could not be
/// inferred is `None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FastqRecord {
    /// The path or URI of the file.
    pub path: String,
    pub index1: Option<BString>,
    pub index2: Option<BString>,
    pub lane: Option<String>,
}

impl FastqRecord {
    /// Creates a new `FastqRecord` inferring the index pair and lane from the file name.
    pub fn new(path: &str) -> FastqRecord {
        let file_name = file_name_of(path);
        let (index1, index2) = match INDEX_PAIR_REGEX.captures(file_name) {
            Some(captures) => (
                captures.get(1).map(|m| BString::from(m.as_str())),
                captures.get(2).map(|m| BString::from(m.as_str())),
            ),
            None => (None, None),
        };
        FastqRecord { path: path.to_string(), index1, index2, lane: lane_token(file_name) }
    }

    /// The final component of the path.
    pub fn file_name(&self) -> &str {
        file_name_of(&self.path)
    }

    /// The read type inferred from the file name.
    pub fn read_type(&self) -> ReadType {
        ReadType::from_file_name(self.file_name())
    }

    /// The `(index1, index2, lane)` key used to join against the index sheet, or `None` if any
    /// part could not be inferred from the file name.
    pub fn join_key(&self) -> Option<(&BStr, &BStr, &str)> {
        match (&self.index1, &self.index2, &self.lane) {
            (Some(i1), Some(i2), Some(lane)) => Some((i1.as_bstr(), i2.as_bstr(), lane.as_str())),
            _ => None,
        }
    }

    /// True if the index pair and lane were all inferred from the file name.
    pub fn is_parsed(&self) -> bool {
        self.join_key().is_some()
    }
}

/// Finds the lane: the first run of digits delimited by `.` on both sides, skipping the read
/// number of an `unmapped.<n>.` read marker.
fn lane_token(file_name: &str) -> Option<String> {
    file_name
        .split('.')
        .tuple_windows()
        .find(|(before, token, _)| {
            !token.is_empty()
                && token.bytes().all(|b| b.is_ascii_digit())
                && !before.ends_with("unmapped")
        })
        .map(|(_, token, _)| token.to_string())
}

/// Where to find the sequencing output files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastqSource {
    /// A directory holding the files; sub-directories are not searched.
    Directory(PathBuf),
    /// A text file with one path or URI per line, e.g. an object store listing.
    Listing(PathBuf),
}

impl FastqSource {
    /// Lists all the files in the source ending with `suffix` and infers their index pair and
    /// lane.  Files whose names cannot be parsed are returned with `None` values.  The records are
    /// returned sorted by path.
    pub fn discover(&self, suffix: &str) -> Result<Vec<FastqRecord>> {
        let locations = match self {
            FastqSource::Directory(dir) => list_directory(dir)?,
            FastqSource::Listing(listing) => {
                let io = Io::default();
                io.read_lines(listing)
                    .with_context(|| {
                        format!("Failed to read fastq listing {}", listing.to_string_lossy())
                    })?
                    .into_iter()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect()
            }
        };

        let mut fastqs: Vec<FastqRecord> = locations
            .iter()
            .filter(|l| file_name_of(l).ends_with(suffix))
            .map(|l| FastqRecord::new(l))
            .collect();
        fastqs.sort();

        let num_unparsed = fastqs.iter().filter(|f| !f.is_parsed()).count();
        info!(
            "Found {} sequencing files ending with {} in {}, {} with names that could not be parsed",
            fastqs.len(),
            suffix,
            self,
            num_unparsed
        );
        for fastq in fastqs.iter().filter(|f| !f.is_parsed()) {
            debug!("Could not infer index pair and lane from {}", fastq.path);
        }
        Ok(fastqs)
    }
}

impl std::fmt::Display for FastqSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FastqSource::Directory(path) | FastqSource::Listing(path) => {
                write!(f, "{}", path.to_string_lossy())
            }
        }
    }
}

/// Lists the files (not directories) directly inside the given directory.
fn list_directory(dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory {}", dir.to_string_lossy()))?;
    let mut locations = vec![];
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list directory {}", dir.to_string_lossy()))?
            .path();
        if path.is_file() {
            locations.push(path.to_string_lossy().to_string());
        }
    }
    Ok(locations)
}
