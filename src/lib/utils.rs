//! Utility functions.
use std::path::{Path, PathBuf};

use anyhow::Context;
use bstr::{BStr, BString};
use log::debug;
use path_absolutize::Absolutize;

pub mod built_info {
    use lazy_static::lazy_static;
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    /// Get a software version string including
    ///   - Git commit hash
    ///   - Git dirty info (whether the repo had uncommitted changes)
    ///   - Cargo package version if no git info found
    fn get_software_version() -> String {
        let prefix = if let Some(s) = GIT_COMMIT_HASH {
            format!("{}-{}", PKG_VERSION, s[0..8].to_owned())
        } else {
            // This shouldn't happen
            PKG_VERSION.to_string()
        };
        let suffix = match GIT_DIRTY {
            Some(true) => "-dirty",
            _ => "",
        };
        format!("{}{}", prefix, suffix)
    }

    lazy_static! {
        /// Version of the software with git hash
        pub static ref VERSION: String = get_software_version();
    }
}

/// Returns the complement of a single base.  Upper and lower case `ACGTN` are complemented,
/// anything else is returned unchanged so that a double reverse complement is always the
/// identity.
const fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        other => other,
    }
}

/// Calculate the reverse complement of the given sequence.
pub fn reverse_complement(bases: &BStr) -> BString {
    bases.iter().rev().map(|&b| complement(b)).collect::<Vec<u8>>().into()
}

/// Normalizes an index sequence read from a spreadsheet cell: surrounding whitespace is removed
/// and the bases are upper-cased.
pub fn normalize_index(raw: &str) -> BString {
    BString::from(raw.trim().as_bytes().to_ascii_uppercase())
}

/// Replaces every character that is unsafe in a file name with `_`.  Only ASCII alphanumerics,
/// `-`, `_` and `.` are kept.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

/// Returns true if the given location looks like an object store URI (e.g. `gs://bucket/key`).
pub fn is_uri(location: &str) -> bool {
    location
        .find("://")
        .map_or(false, |i| i > 0 && location[..i].chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Joins a file name onto a destination prefix.  URIs are joined with `/`, anything else is
/// treated as a filesystem path.
pub fn join_location(prefix: &str, file_name: &str) -> String {
    if is_uri(prefix) {
        format!("{}/{}", prefix.trim_end_matches('/'), file_name)
    } else {
        Path::new(prefix).join(file_name).to_string_lossy().to_string()
    }
}

/// Copies a staged file to its destination, creating any missing parent directories.  An
/// existing destination is overwritten.  Nothing is copied if the destination is the staged file.
pub fn copy_to_destination(staged: &Path, destination: &Path) -> anyhow::Result<()> {
    let same_file = staged
        .absolutize()
        .and_then(|s| destination.absolutize().map(|d| s == d))
        .with_context(|| format!("Unable to resolve {}", destination.to_string_lossy()))?;
    if same_file {
        debug!("{} is already at its destination", staged.to_string_lossy());
        return Ok(());
    }
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Unable to create directory: {}", parent.to_string_lossy())
            })?;
        }
    }
    std::fs::copy(staged, destination).with_context(|| {
        format!(
            "Unable to copy {} to {}",
            staged.to_string_lossy(),
            destination.to_string_lossy()
        )
    })?;
    debug!("Copied {} to {}", staged.to_string_lossy(), destination.to_string_lossy());
    Ok(())
}

/// Returns the final component of a path or URI.
pub fn file_name_of(location: &str) -> &str {
    location.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(location)
}

/// Converts a location to a `PathBuf`, failing for URIs since they cannot be written to directly.
pub fn local_path(location: &str) -> anyhow::Result<PathBuf> {
    anyhow::ensure!(
        !is_uri(location),
        "Cannot write to {}: object store destinations must be mounted locally",
        location
    );
    Ok(PathBuf::from(location))
}

#[cfg(test)]
mod test {
    use bstr::{BStr, BString, ByteSlice};
    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    #[rstest]
    #[case("ACGT", "ACGT")]
    #[case("AAAACCC", "GGGTTTT")]
    #[case("CATGCATGCA", "TGCATGCATG")]
    #[case("ACGTN", "NACGT")]
    #[case("acgt", "acgt")]
    #[case("", "")]
    fn test_reverse_complement(#[case] bases: &str, #[case] expected: &str) {
        assert_eq!(reverse_complement(<&BStr>::from(bases)), BString::from(expected));
    }

    #[rstest]
    #[case("GATTACA")]
    #[case("ACGTACGTAC")]
    #[case("NNACG-T.x")]
    fn test_reverse_complement_twice_is_identity(#[case] bases: &str) {
        let once = reverse_complement(<&BStr>::from(bases));
        assert_eq!(reverse_complement(once.as_bstr()), BString::from(bases));
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index("  acgtAC \t"), BString::from("ACGTAC"));
        assert_eq!(normalize_index(""), BString::from(""));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Sample1_GEX"), "Sample1_GEX");
        assert_eq!(sanitize_file_name("Sample 1/GEX"), "Sample_1_GEX");
        assert_eq!(sanitize_file_name("S-1.v2"), "S-1.v2");
    }

    #[test]
    fn test_is_uri_and_join_location() {
        assert!(is_uri("gs://bucket/dir"));
        assert!(!is_uri("/data/dir"));
        assert!(!is_uri("://nope"));
        assert_eq!(join_location("gs://bucket/dir/", "a.tsv"), "gs://bucket/dir/a.tsv");
        assert_eq!(join_location("/data/dir", "a.tsv"), "/data/dir/a.tsv");
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("gs://bucket/dir/a.fastq.gz"), "a.fastq.gz");
        assert_eq!(file_name_of("a.fastq.gz"), "a.fastq.gz");
    }

    #[test]
    fn test_local_path_rejects_uri() {
        assert!(local_path("gs://bucket/sheet.tsv").is_err());
        assert_eq!(local_path("/tmp/sheet.tsv").unwrap(), PathBuf::from("/tmp/sheet.tsv"));
    }

    #[test]
    fn test_copy_to_destination_creates_parents_and_overwrites() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.tsv");
        std::fs::write(&staged, "first").unwrap();
        let destination = dir.path().join("a").join("b").join("out.tsv");

        copy_to_destination(&staged, &destination).unwrap();
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "first");

        std::fs::write(&staged, "second").unwrap();
        copy_to_destination(&staged, &destination).unwrap();
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "second");
    }

    #[test]
    fn test_copy_to_destination_onto_itself() {
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged.tsv");
        std::fs::write(&staged, "content").unwrap();
        let same = dir.path().join("sub").join("..").join("staged.tsv");
        copy_to_destination(&staged, &same).unwrap();
        assert_eq!(std::fs::read_to_string(&staged).unwrap(), "content");
    }
}
