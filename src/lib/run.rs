use anyhow::{ensure, Context, Result};
use log::info;

use crate::{
    index_sheet::IndexSheet,
    manifest::{build_manifests, ManifestWriter},
    opts::{Opts, Stage},
    reconcile::reconcile,
    review::ReviewReport,
    sample_sheet::PublishedSheet,
};

/// Runs every stage up to and including `--stop-after`.  The review flags are written to the
/// output directory whether or not the run succeeds.
pub fn run(opts: Opts) -> Result<()> {
    opts.validate()?;

    // Preflight checks
    ensure!(
        opts.output_dir.is_dir(),
        "Output directory does not exist: {}",
        &opts.output_dir.to_string_lossy()
    );
    ensure!(
        opts.index_sheet.is_file(),
        "Index sheet does not exist: {}",
        &opts.index_sheet.to_string_lossy()
    );

    let mut report = ReviewReport::new();
    let result = run_stages(&opts, &mut report);
    report.log_summary();
    let written = report.write(&opts.output_dir).with_context(|| {
        format!("Unable to write review flags to {}", opts.output_dir.to_string_lossy())
    });
    result.and(written)
}

fn run_stages(opts: &Opts, report: &mut ReviewReport) -> Result<()> {
    info!("Reconciling the index sheet against the sequencing files");
    let sheet = IndexSheet::from_path(&opts.index_sheet, opts.sheet_layout()).with_context(|| {
        format!("Unable to read index sheet: {}", opts.index_sheet.to_string_lossy())
    })?;
    let fastqs = opts.fastq_source()?.discover(&opts.fastq_suffix)?;
    let reconciliation = reconcile(&sheet.records, &fastqs, report);
    reconciliation.write_reports(&opts.output_dir)?;
    if opts.stop_after == Stage::Reconcile {
        info!("Stopping after reconciliation, see {}", opts.output_dir.to_string_lossy());
        return Ok(());
    }

    info!("Writing sample manifests");
    let manifests = build_manifests(&reconciliation.matched, report);
    let writer = ManifestWriter::new(&opts.output_dir, opts.manifest_destinations());
    let written = writer.write(&manifests)?;
    if opts.stop_after == Stage::Manifests {
        info!("Stopping after writing manifests, see {}", writer.staging_dir().to_string_lossy());
        return Ok(());
    }

    info!("Publishing the sample sheet");
    let published = PublishedSheet::from_manifests(&written, report);
    published.publish(&opts.output_dir, opts.sheet_destination.as_deref())?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use fgoxide::io::Io;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        manifest::MANIFESTS_DIR_NAME,
        reconcile::{MATCHED_FILE_NAME, UNMATCHED_FASTQS_FILE_NAME, UNMATCHED_INDEX_FILE_NAME},
        review::REVIEW_FLAGS_FILE_NAME,
        sample_sheet::SAMPLE_SHEET_FILE_NAME,
    };

    const READS: [&str; 4] = ["unmapped.1", "unmapped.2", "barcode_1", "barcode_2"];

    /// Two lane blocks: Donor1_GEX on lane 1, Donor1_VDJ on lane 2 and Donor2_GEX (with no
    /// sequencing files) on lane 1.
    const INDEX_SHEET: &str = "\
Batch 7 index sheet,,,,,,
Well,Sample,Index1,Index2,Sample,Index1,Index2
A1,Donor1_GEX,ACGTACGTAC,CATGCATGCA,Donor1_VDJ,AAAACCCCGG,GGCCCCAAAA
A2,Donor2_GEX,GGGGAAAACC,TTTTTTTTTT,,,
";

    /// The sequencing file names: four reads each for the two Donor1 libraries, one file that
    /// matches nothing.
    fn fastq_names() -> Vec<String> {
        let mut names = vec![];
        for read in READS {
            names.push(format!("H7A.1.ACGTACGTAC_TGCATGCATG.{}.fastq.gz", read));
            names.push(format!("H7A.2.AAAACCCCGG_TTTTGGGGCC.{}.fastq.gz", read));
        }
        names.push(String::from("H7A.3.CCCCCCCCCC_AAAAAAAAAA.unmapped.1.fastq.gz"));
        names
    }

    /// Writes the index sheet and sequencing files, returning options that read them.
    fn setup_inputs(dir: &Path) -> Opts {
        let index_sheet = dir.join("indexes.csv");
        std::fs::write(&index_sheet, INDEX_SHEET).unwrap();

        let fastqs = dir.join("runs");
        std::fs::create_dir(&fastqs).unwrap();
        for name in fastq_names() {
            std::fs::write(fastqs.join(name), "").unwrap();
        }
        std::fs::write(fastqs.join("notes.txt"), "").unwrap();

        let output_dir = dir.join("out");
        std::fs::create_dir(&output_dir).unwrap();

        Opts {
            index_sheet,
            fastqs: Some(fastqs),
            output_dir,
            manifest_destination: dir.join("bucket/manifests").to_string_lossy().to_string(),
            sheet_destination: Some(dir.join("bucket/sample_sheet.tsv")),
            ..Opts::default()
        }
    }

    fn read_lines(path: PathBuf) -> Vec<String> {
        Io::default().read_lines(&path).unwrap()
    }

    #[test]
    fn test_end_to_end() {
        let dir = tempdir().unwrap();
        let opts = setup_inputs(dir.path());
        let output_dir = opts.output_dir.clone();
        let destination = PathBuf::from(&opts.manifest_destination);
        run(opts).unwrap();

        // reconciliation reports, each with a header line
        assert_eq!(read_lines(output_dir.join(MATCHED_FILE_NAME)).len(), 9);
        let unmatched_index = read_lines(output_dir.join(UNMATCHED_INDEX_FILE_NAME));
        assert_eq!(unmatched_index.len(), 2);
        assert!(unmatched_index[1].starts_with("Donor2_GEX\t"));
        let unmatched_fastqs = read_lines(output_dir.join(UNMATCHED_FASTQS_FILE_NAME));
        assert_eq!(unmatched_fastqs.len(), 2);
        assert!(unmatched_fastqs[1].contains("H7A.3.CCCCCCCCCC_AAAAAAAAAA.unmapped.1.fastq.gz"));

        // manifests, staged and copied
        let runs = dir.path().join("runs");
        let gex = read_lines(destination.join("Donor1_GEX.tsv"));
        assert_eq!(
            gex,
            vec![READS
                .iter()
                .map(|read| {
                    runs.join(format!("H7A.1.ACGTACGTAC_TGCATGCATG.{}.fastq.gz", read))
                        .to_string_lossy()
                        .to_string()
                })
                .collect::<Vec<_>>()
                .join("\t")]
        );
        assert_eq!(read_lines(output_dir.join(MANIFESTS_DIR_NAME).join("Donor1_GEX.tsv")), gex);
        assert!(destination.join("Donor1_VDJ.tsv").is_file());

        // published sheet, staged and copied
        let sheet = read_lines(output_dir.join(SAMPLE_SHEET_FILE_NAME));
        assert_eq!(
            sheet,
            vec![
                String::from("entity:sample_id\ttsvGEX\ttsvVDJ\ttsvABs"),
                format!(
                    "Donor1\t{}\t{}\t",
                    destination.join("Donor1_GEX.tsv").to_string_lossy(),
                    destination.join("Donor1_VDJ.tsv").to_string_lossy()
                ),
            ]
        );
        assert_eq!(read_lines(dir.path().join("bucket/sample_sheet.tsv")), sheet);

        // nothing to review
        assert!(output_dir.join(REVIEW_FLAGS_FILE_NAME).is_file());
        assert!(read_lines(output_dir.join(REVIEW_FLAGS_FILE_NAME)).is_empty());
    }

    #[test]
    fn test_end_to_end_from_listing() {
        let dir = tempdir().unwrap();
        let listing = dir.path().join("listing.txt");
        let uris: Vec<String> =
            fastq_names().iter().map(|n| format!("gs://bucket/runs/{}", n)).collect();
        std::fs::write(&listing, uris.join("\n")).unwrap();
        let opts = Opts { fastqs: None, fastq_listing: Some(listing), ..setup_inputs(dir.path()) };
        let output_dir = opts.output_dir.clone();
        run(opts).unwrap();

        let gex = read_lines(dir.path().join("bucket/manifests/Donor1_GEX.tsv"));
        assert_eq!(gex.len(), 1);
        assert!(gex[0].starts_with("gs://bucket/runs/H7A.1.ACGTACGTAC_TGCATGCATG.unmapped.1"));
        assert_eq!(read_lines(output_dir.join(SAMPLE_SHEET_FILE_NAME)).len(), 2);
    }

    #[test]
    fn test_stop_after_reconcile() {
        let dir = tempdir().unwrap();
        let opts = Opts { stop_after: Stage::Reconcile, ..setup_inputs(dir.path()) };
        let output_dir = opts.output_dir.clone();
        run(opts).unwrap();

        assert!(output_dir.join(MATCHED_FILE_NAME).is_file());
        assert!(output_dir.join(REVIEW_FLAGS_FILE_NAME).is_file());
        assert!(!output_dir.join(MANIFESTS_DIR_NAME).exists());
        assert!(!output_dir.join(SAMPLE_SHEET_FILE_NAME).exists());
        assert!(!dir.path().join("bucket").exists());
    }

    #[test]
    fn test_stop_after_manifests() {
        let dir = tempdir().unwrap();
        let opts = Opts { stop_after: Stage::Manifests, ..setup_inputs(dir.path()) };
        let output_dir = opts.output_dir.clone();
        run(opts).unwrap();

        assert!(output_dir.join(MANIFESTS_DIR_NAME).join("Donor1_VDJ.tsv").is_file());
        assert!(dir.path().join("bucket/manifests/Donor1_VDJ.tsv").is_file());
        assert!(!output_dir.join(SAMPLE_SHEET_FILE_NAME).exists());
        assert!(!dir.path().join("bucket/sample_sheet.tsv").exists());
    }

    #[test]
    fn test_flags_written_for_anomalies() {
        let dir = tempdir().unwrap();
        let opts = setup_inputs(dir.path());
        // no I2 file for Donor1_GEX, and an unparseable name
        let runs = opts.fastqs.clone().unwrap();
        std::fs::remove_file(runs.join("H7A.1.ACGTACGTAC_TGCATGCATG.barcode_2.fastq.gz")).unwrap();
        std::fs::write(runs.join("Undetermined.fastq.gz"), "").unwrap();
        let output_dir = opts.output_dir.clone();
        run(opts).unwrap();

        let flags = read_lines(output_dir.join(REVIEW_FLAGS_FILE_NAME));
        assert_eq!(flags.len(), 3);
        assert_eq!(flags[0], "kind\tsubject\tdetail");
        assert!(flags[1].starts_with("UnparsedFastq\t"));
        assert_eq!(flags[2], "MissingReadType\tDonor1_GEX\tlane 1 has no I2 file");
    }

    #[test]
    fn test_missing_output_dir_fails() {
        let dir = tempdir().unwrap();
        let opts = Opts { output_dir: dir.path().join("missing"), ..setup_inputs(dir.path()) };
        assert!(run(opts).is_err());
    }

    #[test]
    fn test_invalid_index_sheet_fails_and_writes_flags() {
        let dir = tempdir().unwrap();
        let opts = Opts { lanes: Some(3), ..setup_inputs(dir.path()) };
        let output_dir = opts.output_dir.clone();
        let err = run(opts).unwrap_err();
        assert!(format!("{:#}", err).contains("Unable to read index sheet"));
        assert!(output_dir.join(REVIEW_FLAGS_FILE_NAME).is_file());
        assert!(!output_dir.join(MATCHED_FILE_NAME).exists());
    }
}
