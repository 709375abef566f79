//! Anomalies surfaced to the operator for manual review.
//!
//! Nothing in the pipeline resolves these automatically: each is logged as a warning when it is
//! raised and all of them are written to `review_flags.tsv` at the end of a run.
use std::path::Path;

use anyhow::Result;
use fgoxide::io::DelimFile;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

/// The file name the review flags are written to.
pub const REVIEW_FLAGS_FILE_NAME: &str = "review_flags.tsv";

/// The kinds of anomaly that may be flagged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize,
)]
pub enum FlagKind {
    /// The index pair or lane could not be inferred from a sequencing file name.
    UnparsedFastq,
    /// The same sample, index pair and lane is listed more than once in the index sheet.
    DuplicateIndexRecord,
    /// A sample matched more sequencing files than there are read types.
    ExcessMatches,
    /// A sequencing file matched more than one sample.
    AmbiguousFastq,
    /// A matched sequencing file has no recognizable read type.
    UnknownReadType,
    /// More than one sequencing file claims the same sample, lane and read type.
    DuplicateReadType,
    /// A sample has no sequencing file for a read type on a lane.
    MissingReadType,
    /// A sample name carries no known library type; its manifest is not written.
    UnclassifiedLibrary,
    /// More than one manifest of the same library type share a sample stem.
    DuplicateLibrary,
    /// A manifest has a library type with no column in the published sheet.
    UnpublishedLibrary,
    /// A published sheet row has no manifest in any column.
    EmptySheetRow,
}

/// A single anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewFlag {
    pub kind: FlagKind,
    /// What the flag is about: a sample name, sample stem or file path.
    pub subject: String,
    pub detail: String,
}

/// Collects the [`ReviewFlag`]s raised over a run.
#[derive(Debug, Default, Clone)]
pub struct ReviewReport {
    pub flags: Vec<ReviewFlag>,
}

impl ReviewReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises a flag, logging it as a warning.
    pub fn flag<S: Into<String>, D: Into<String>>(&mut self, kind: FlagKind, subject: S, detail: D) {
        let flag = ReviewFlag { kind, subject: subject.into(), detail: detail.into() };
        warn!("[{}] {}: {}", flag.kind, flag.subject, flag.detail);
        self.flags.push(flag);
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// The number of flags of the given kind.
    pub fn count(&self, kind: FlagKind) -> usize {
        self.flags.iter().filter(|f| f.kind == kind).count()
    }

    /// The flags of the given kind.
    pub fn of_kind(&self, kind: FlagKind) -> impl Iterator<Item = &ReviewFlag> {
        self.flags.iter().filter(move |f| f.kind == kind)
    }

    /// Logs the number of flags per kind.
    pub fn log_summary(&self) {
        if self.is_empty() {
            info!("No anomalies flagged for review");
            return;
        }
        let summary = FlagKind::iter()
            .filter_map(|kind| match self.count(kind) {
                0 => None,
                n => Some(format!("{}: {}", kind, n)),
            })
            .join(", ");
        warn!("{} anomalies flagged for review ({})", self.len(), summary);
    }

    /// Writes all flags to `review_flags.tsv` in the given directory, ordered by kind.
    pub fn write<P: AsRef<Path>>(&self, output_dir: P) -> Result<()> {
        let output_path = output_dir.as_ref().join(REVIEW_FLAGS_FILE_NAME);
        let delim = DelimFile::default();
        delim.write_tsv(&output_path, self.flags.iter().sorted_by_key(|f| f.kind))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use fgoxide::io::Io;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_flag_and_count() {
        let mut report = ReviewReport::new();
        assert!(report.is_empty());
        report.flag(FlagKind::UnparsedFastq, "a.fastq.gz", "no index pair");
        report.flag(FlagKind::MissingReadType, "S1_GEX", "lane 1 has no I2");
        report.flag(FlagKind::UnparsedFastq, "b.fastq.gz", "no lane");
        assert_eq!(report.len(), 3);
        assert_eq!(report.count(FlagKind::UnparsedFastq), 2);
        assert_eq!(report.count(FlagKind::EmptySheetRow), 0);
        assert_eq!(
            report.of_kind(FlagKind::UnparsedFastq).map(|f| f.subject.as_str()).collect_vec(),
            vec!["a.fastq.gz", "b.fastq.gz"]
        );
    }

    #[test]
    fn test_write_sorted_by_kind() {
        let dir = tempdir().unwrap();
        let mut report = ReviewReport::new();
        report.flag(FlagKind::EmptySheetRow, "S9", "no manifests");
        report.flag(FlagKind::UnparsedFastq, "a.fastq.gz", "no index pair");
        report.write(dir.path()).unwrap();

        let lines = Io::default().read_lines(&dir.path().join(REVIEW_FLAGS_FILE_NAME)).unwrap();
        assert_eq!(
            lines,
            vec![
                "kind\tsubject\tdetail",
                "UnparsedFastq\ta.fastq.gz\tno index pair",
                "EmptySheetRow\tS9\tno manifests",
            ]
        );
    }
}
