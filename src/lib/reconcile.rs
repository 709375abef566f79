//! Joins the index sheet against the discovered sequencing files on `(index1, index2, lane)`.
//!
//! Records that do not match are expected: a submission may mix several independent sample
//! sets, and which side is left unmatched tells the operator how to separate them.  They are
//! returned and reported, never treated as errors.
use std::path::Path;

use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use bstr::{BStr, ByteSlice};
use fgoxide::io::DelimFile;
use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::{
    fastq::FastqRecord,
    index_sheet::IndexRecord,
    review::{FlagKind, ReviewReport},
};

/// The most sequencing files one sample is expected to match on a lane: R1, R2, I1 and I2.
pub const EXPECTED_MAX_MATCHES: usize = 4;

pub const MATCHED_FILE_NAME: &str = "matched.tsv";
pub const UNMATCHED_INDEX_FILE_NAME: &str = "unmatched_index_records.tsv";
pub const UNMATCHED_FASTQS_FILE_NAME: &str = "unmatched_fastqs.tsv";

/// An index sheet record paired with a sequencing file that has the same index pair and lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRecord {
    pub index: IndexRecord,
    pub fastq: FastqRecord,
}

/// One row of the `matched.tsv` report.
#[derive(Debug, Serialize)]
struct MatchedRow<'a> {
    sample_name: &'a str,
    lane: &'a str,
    index1: &'a BStr,
    index2: &'a BStr,
    read_type: String,
    path: &'a str,
}

/// The outcome of the join.  Every index record is either in `matched` or `unmatched_index`,
/// and every sequencing file is either in `matched` or `unmatched_fastqs`.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub matched: Vec<MatchedRecord>,
    pub unmatched_index: Vec<IndexRecord>,
    pub unmatched_fastqs: Vec<FastqRecord>,
}

type JoinKey<'a> = (&'a BStr, &'a BStr, &'a str);

/// Inner joins the index records and sequencing files on `(index1, index2, lane)`.
///
/// Matches are returned in index sheet order, and for each index record in sequencing file
/// order.  Unusual cardinalities are flagged on the given report:
/// - [`FlagKind::UnparsedFastq`] for files whose name did not yield an index pair and lane
/// - [`FlagKind::DuplicateIndexRecord`] for repeated index sheet records
/// - [`FlagKind::ExcessMatches`] for index records matching more than [`EXPECTED_MAX_MATCHES`] files
/// - [`FlagKind::AmbiguousFastq`] for files matched by more than one sample name
pub fn reconcile(
    index_records: &[IndexRecord],
    fastqs: &[FastqRecord],
    report: &mut ReviewReport,
) -> Reconciliation {
    let mut by_key: AHashMap<JoinKey, Vec<usize>> = AHashMap::new();
    for (i, fastq) in fastqs.iter().enumerate() {
        match fastq.join_key() {
            Some(key) => by_key.entry(key).or_insert_with(Vec::new).push(i),
            None => report.flag(
                FlagKind::UnparsedFastq,
                fastq.path.as_str(),
                describe_unparsed(fastq),
            ),
        }
    }

    let mut reconciliation = Reconciliation::default();
    let mut fastq_samples: Vec<AHashSet<&str>> = vec![AHashSet::new(); fastqs.len()];
    let mut seen: AHashSet<(&str, JoinKey)> = AHashSet::new();

    for record in index_records {
        let key: JoinKey =
            (record.index1.as_bstr(), record.index2.as_bstr(), record.lane.as_str());
        if !seen.insert((record.sample_name.as_str(), key)) {
            report.flag(
                FlagKind::DuplicateIndexRecord,
                record.sample_name.as_str(),
                format!(
                    "listed again on line {} for lane {} with {}+{}",
                    record.line_number, record.lane, record.index1, record.index2
                ),
            );
        }

        match by_key.get(&key) {
            None => reconciliation.unmatched_index.push(record.clone()),
            Some(matches) => {
                if matches.len() > EXPECTED_MAX_MATCHES {
                    report.flag(
                        FlagKind::ExcessMatches,
                        record.sample_name.as_str(),
                        format!(
                            "matched {} sequencing files on lane {}, expected at most {}",
                            matches.len(),
                            record.lane,
                            EXPECTED_MAX_MATCHES
                        ),
                    );
                }
                for &i in matches {
                    fastq_samples[i].insert(record.sample_name.as_str());
                    reconciliation
                        .matched
                        .push(MatchedRecord { index: record.clone(), fastq: fastqs[i].clone() });
                }
            }
        }
    }

    for (fastq, samples) in fastqs.iter().zip(fastq_samples.iter()) {
        match samples.len() {
            0 => reconciliation.unmatched_fastqs.push(fastq.clone()),
            1 => (),
            _ => report.flag(
                FlagKind::AmbiguousFastq,
                fastq.path.as_str(),
                format!("matched samples {}", samples.iter().sorted().join(", ")),
            ),
        }
    }

    info!(
        "Matched {} sequencing files to {} index records; {} index records and {} sequencing files \
        were not matched",
        fastqs.len() - reconciliation.unmatched_fastqs.len(),
        index_records.len() - reconciliation.unmatched_index.len(),
        reconciliation.unmatched_index.len(),
        reconciliation.unmatched_fastqs.len()
    );

    reconciliation
}

/// Describes which values could not be inferred from a file name.
fn describe_unparsed(fastq: &FastqRecord) -> String {
    let missing = [
        ("index pair", fastq.index1.is_none() || fastq.index2.is_none()),
        ("lane", fastq.lane.is_none()),
    ]
    .iter()
    .filter(|(_, is_missing)| *is_missing)
    .map(|(name, _)| *name)
    .join(" and ");
    format!("could not infer the {} from the file name", missing)
}

impl Reconciliation {
    /// The distinct sample names with at least one match, in index sheet order.
    pub fn matched_sample_names(&self) -> Vec<&str> {
        self.matched.iter().map(|m| m.index.sample_name.as_str()).unique().collect()
    }

    /// Writes `matched.tsv`, `unmatched_index_records.tsv` and `unmatched_fastqs.tsv` to the
    /// given directory.
    pub fn write_reports<P: AsRef<Path>>(&self, output_dir: P) -> Result<()> {
        let delim = DelimFile::default();

        let output_path = output_dir.as_ref().join(MATCHED_FILE_NAME);
        delim.write_tsv(
            &output_path,
            self.matched.iter().map(|m| MatchedRow {
                sample_name: &m.index.sample_name,
                lane: &m.index.lane,
                index1: m.index.index1.as_bstr(),
                index2: m.index.index2.as_bstr(),
                read_type: m.fastq.read_type().to_string(),
                path: &m.fastq.path,
            }),
        )?;

        let output_path = output_dir.as_ref().join(UNMATCHED_INDEX_FILE_NAME);
        delim.write_tsv(&output_path, self.unmatched_index.iter())?;

        let output_path = output_dir.as_ref().join(UNMATCHED_FASTQS_FILE_NAME);
        delim.write_tsv(&output_path, self.unmatched_fastqs.iter())?;

        Ok(())
    }
}
