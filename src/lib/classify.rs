//! Substring rules that classify sequencing files by read type and samples by library type.
//!
//! All naming conventions live here so that new conventions can be added without touching the
//! join or pivot logic.  Every classifier has an explicit `Unknown` outcome; callers are expected
//! to flag those for review rather than drop them.

use strum::{Display, EnumIter};

/// The role a sequencing file plays for a paired-end, dual-indexed library.
///
/// The variant order is the manifest column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum ReadType {
    R1,
    R2,
    I1,
    I2,
    Unknown,
}

/// File name markers for each read type, checked in order.
const READ_TYPE_MARKERS: &[(&str, ReadType)] = &[
    ("unmapped.1", ReadType::R1),
    ("unmapped.2", ReadType::R2),
    ("barcode_1", ReadType::I1),
    ("barcode_2", ReadType::I2),
];

impl ReadType {
    /// The read types written to a manifest, in column order.
    pub const MANIFEST_COLUMNS: [ReadType; 4] =
        [ReadType::R1, ReadType::R2, ReadType::I1, ReadType::I2];

    /// Classifies a sequencing file by its name.  The markers are mutually exclusive; a name
    /// carrying none of them (or more than one) is `Unknown`.
    pub fn from_file_name(file_name: &str) -> ReadType {
        let mut found = READ_TYPE_MARKERS.iter().filter(|(marker, _)| file_name.contains(marker));
        match (found.next(), found.next()) {
            (Some((_, kind)), None) => *kind,
            _ => ReadType::Unknown,
        }
    }
}

/// The assay type of a sequencing library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum LibraryType {
    #[strum(serialize = "GEX")]
    Gex,
    #[strum(serialize = "VDJ")]
    Vdj,
    #[strum(serialize = "CITESeq")]
    CiteSeq,
    #[strum(serialize = "BCR")]
    Bcr,
    Unknown,
}

/// Sample name markers for each library type, checked in order.  The first marker found wins.
const LIBRARY_TYPE_MARKERS: &[(&str, LibraryType)] = &[
    ("GEX", LibraryType::Gex),
    ("VDJ", LibraryType::Vdj),
    ("CITE", LibraryType::CiteSeq),
    ("BCR", LibraryType::Bcr),
];

/// Library type markers removed from a sample name to derive its stem.  Case-sensitive.
const STEM_SUFFIXES: &[&str] = &["_GEX", "_VDJ", "_BCR", "_CITEseq"];

impl LibraryType {
    /// Classifies a sample by its name.
    pub fn from_sample_name(sample_name: &str) -> LibraryType {
        LIBRARY_TYPE_MARKERS
            .iter()
            .find(|(marker, _)| sample_name.contains(marker))
            .map_or(LibraryType::Unknown, |(_, kind)| *kind)
    }

    pub fn is_known(self) -> bool {
        self != LibraryType::Unknown
    }
}

/// Derives the biological sample identifier from a sample name by removing library type markers.
///
/// Markers are removed repeatedly until none remain, so applying this to its own output is a
/// no-op.
pub fn sample_stem(sample_name: &str) -> String {
    let mut stem = sample_name.to_string();
    loop {
        let stripped =
            STEM_SUFFIXES.iter().fold(stem.clone(), |acc, suffix| acc.replace(suffix, ""));
        if stripped == stem {
            return stem;
        }
        stem = stripped;
    }
}
