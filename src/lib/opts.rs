#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{anyhow, bail, ensure, Result};
use clap::{ArgEnum, Parser, PossibleValue};
use env_logger::Env;

use crate::{
    fastq::{FastqSource, DEFAULT_FASTQ_SUFFIX},
    index_sheet::SheetLayout,
    manifest::{AlternateDestination, ManifestDestinations},
    utils::{built_info, local_path},
};

pub static TOOL_NAME: &str = "scprep";

pub static DOC_LINK_AND_SUPPORT_EMAIL: &str =
    "For usage run `scprep --help`; report problems to the maintainers of this batch's pipeline.";

static SHORT_USAGE: &str =
    "Reconciles a sample index sheet against sequencing files and writes per-sample manifests.";

static LONG_USAGE: &str = "
Reconciles a sample index sheet against sequencing files and writes per-sample manifests.

The index sheet is a CSV (or TSV, for files ending in .tsv or .txt) exported from the laboratory
spreadsheet.  Samples are laid out in horizontal blocks of three columns (sample name, index1,
index2), one block per lane.  The header is on --header-row and the first block starts at the
0-based column --first-block-column.  Index2 is reverse complemented before matching.

Sequencing files are found either in a directory (--fastqs) or in a listing file with one path or
URI per line (--fastq-listing).  Their index pair (<index1>_<index2>) and lane (.<lane>.) are
inferred from the file name.

The run has three stages, each of which may be the last (--stop-after):
- reconcile: joins the index sheet and the sequencing files, writing matched.tsv,
  unmatched_index_records.tsv and unmatched_fastqs.tsv to the output directory
- manifests: writes one R1/R2/I1/I2 manifest per sample to the manifest destination
- publish: writes sample_sheet.tsv with one row per sample and copies it to the sheet destination

Anomalies are never resolved automatically; they are written to review_flags.tsv.

Example invocation:

scprep \\
  --index-sheet batch7_indexes.csv \\
  --fastqs /mnt/bucket/batch7/ \\
  --output-dir batch7_prep/ \\
  --manifest-destination /mnt/bucket/batch7/manifests \\
  --sheet-destination /mnt/bucket/batch7/sample_sheet.tsv
";

/// The stage after which a run stops.
#[derive(ArgEnum, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Reconcile,
    Manifests,
    Publish,
}

impl Stage {
    pub fn possible_values<'a>() -> impl Iterator<Item = PossibleValue<'a>> {
        Stage::value_variants().iter().filter_map(ArgEnum::to_possible_value)
    }
}

impl std::str::FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::value_variants()
            .iter()
            .find(|variant| variant.to_possible_value().map_or(false, |v| v.matches(s, false)))
            .copied()
            .ok_or_else(|| anyhow!("Invalid variant: {}", s))
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version = built_info::VERSION.as_str(), about=SHORT_USAGE, long_about=LONG_USAGE, term_width=0)]
pub struct Opts {
    /// Path to the index sheet export.
    #[clap(long, short = 'i', display_order = 1)]
    pub index_sheet: PathBuf,

    /// Directory containing the sequencing files.
    #[clap(
        long,
        short = 'f',
        display_order = 2,
        conflicts_with = "fastq-listing",
        required_unless_present = "fastq-listing"
    )]
    pub fastqs: Option<PathBuf>,

    /// File listing the sequencing files, one path or URI per line.
    #[clap(long, short = 'l', display_order = 2)]
    pub fastq_listing: Option<PathBuf>,

    /// The directory to write manifests, the sample sheet and reports to.
    ///
    /// The directory must exist.  This tool will overwrite existing files.
    #[clap(long, short, display_order = 3)]
    pub output_dir: PathBuf,

    /// The directory manifests are copied to.
    #[clap(long, short = 'd', display_order = 4)]
    pub manifest_destination: String,

    /// The directory manifests of samples whose name contains --alternate-marker are copied to.
    ///
    /// [default: None]
    #[clap(long, display_order = 5)]
    pub alternate_manifest_destination: Option<String>,

    /// Samples whose name contains this marker have their manifest copied to
    /// --alternate-manifest-destination.
    ///
    /// [default: None]
    #[clap(long, requires = "alternate-manifest-destination", display_order = 5)]
    pub alternate_marker: Option<String>,

    /// The path the published sample sheet is copied to.
    ///
    /// [default: None]
    #[clap(long, short = 's', display_order = 6)]
    pub sheet_destination: Option<PathBuf>,

    /// The 1-based row of the index sheet holding the column names.
    #[clap(long, default_value = "2", display_order = 11)]
    pub header_row: usize,

    /// The 0-based column the first block of sample columns starts at.
    #[clap(long, default_value = "1", display_order = 11)]
    pub first_block_column: usize,

    /// The number of blocks (lanes) in the index sheet.
    ///
    /// [default: every complete block in the header]
    #[clap(long, display_order = 11)]
    pub lanes: Option<usize>,

    /// The file name suffix of sequencing files.
    #[clap(long, default_value = DEFAULT_FASTQ_SUFFIX, display_order = 21)]
    pub fastq_suffix: String,

    /// The last stage to run.
    #[clap(long, default_value = "publish", possible_values = Stage::possible_values(), display_order = 31)]
    pub stop_after: Stage,
}

impl Opts {
    /// Checks the options are consistent.  Called before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.fastqs.is_some() == self.fastq_listing.is_some() {
            bail!("Exactly one of --fastqs or --fastq-listing must be given");
        }
        ensure!(self.header_row > 0, "--header-row is 1-based and must be greater than zero");
        ensure!(self.lanes != Some(0), "--lanes must be greater than zero");
        ensure!(!self.fastq_suffix.is_empty(), "--fastq-suffix must not be empty");
        ensure!(!self.manifest_destination.is_empty(), "--manifest-destination must not be empty");
        local_path(&self.manifest_destination)?;
        match (&self.alternate_manifest_destination, &self.alternate_marker) {
            (Some(destination), Some(marker)) => {
                ensure!(!marker.is_empty(), "--alternate-marker must not be empty");
                local_path(destination)?;
            }
            (Some(_), None) => {
                bail!("--alternate-manifest-destination requires --alternate-marker")
            }
            (None, Some(_)) => {
                bail!("--alternate-marker requires --alternate-manifest-destination")
            }
            (None, None) => (),
        }
        if let Some(destination) = &self.sheet_destination {
            local_path(&destination.to_string_lossy())?;
        }
        Ok(())
    }

    /// Where to find the sequencing files.
    pub fn fastq_source(&self) -> Result<FastqSource> {
        match (&self.fastqs, &self.fastq_listing) {
            (Some(dir), None) => Ok(FastqSource::Directory(dir.clone())),
            (None, Some(listing)) => Ok(FastqSource::Listing(listing.clone())),
            _ => bail!("Exactly one of --fastqs or --fastq-listing must be given"),
        }
    }

    /// The layout of the index sheet.
    pub fn sheet_layout(&self) -> SheetLayout {
        SheetLayout {
            header_row: self.header_row,
            first_block_column: self.first_block_column,
            num_blocks: self.lanes,
        }
    }

    /// Where manifests are copied to.
    pub fn manifest_destinations(&self) -> ManifestDestinations {
        let alternate = match (&self.alternate_manifest_destination, &self.alternate_marker) {
            (Some(prefix), Some(marker)) => {
                Some(AlternateDestination { prefix: prefix.clone(), marker: marker.clone() })
            }
            _ => None,
        };
        ManifestDestinations { prefix: self.manifest_destination.clone(), alternate }
    }
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for Opts {
    fn default() -> Self {
        Self {
            index_sheet: PathBuf::default(),
            fastqs: Some(PathBuf::default()),
            fastq_listing: None,
            output_dir: PathBuf::default(),
            manifest_destination: String::from("manifests"),
            alternate_manifest_destination: None,
            alternate_marker: None,
            sheet_destination: None,
            header_row: 2,
            first_block_column: 1,
            lanes: None,
            fastq_suffix: DEFAULT_FASTQ_SUFFIX.to_string(),
            stop_after: Stage::Publish,
        }
    }
}

/// Parse args and set up logging / tracing
pub fn setup() -> Opts {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}
