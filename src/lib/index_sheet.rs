//! Loads the laboratory index sheet: a spreadsheet export with repeating
//! `(sample name, index1, index2)` column blocks, one block per lane.
use std::{fmt::Display, path::Path};

use bstr::{BString, ByteSlice};
use csv::{ReaderBuilder, StringRecord, Trim};
use fgoxide::io::Io;
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;

use crate::utils::{normalize_index, reverse_complement};

/// The number of columns in a single sample block.
pub const BLOCK_WIDTH: usize = 3;

/// The optional line number from the index sheet where an error ocurred.
#[derive(Debug)]
pub struct ErrorLine(pub Option<usize>);

impl Display for ErrorLine {
    /// Writes the line number if present, nothing if it is not None.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(number) => write!(f, "Line {}", number),
            None => Ok(()),
        }
    }
}

/// The error that may occur when parsing the [`IndexSheet`].
#[derive(Error, Debug)]
pub enum IndexSheetError {
    #[error("Io error occurred")]
    FgError(#[from] fgoxide::FgError),

    #[error(transparent)]
    Deserialize(#[from] csv::Error),

    #[error("The index sheet was empty")]
    Empty,

    #[error("The header row must be 1 or greater, found {header_row}")]
    InvalidHeaderRow { header_row: usize },

    #[error("The header on line {line} is missing or blank, the index sheet has {num_lines} lines")]
    NoHeader { line: usize, num_lines: usize },

    #[error(
        "The header on line {line} has {actual} columns, expected at least {expected} for \
        {num_blocks} sample block(s) starting at column {first_column}"
    )]
    MissingColumns {
        line: usize,
        actual: usize,
        expected: usize,
        num_blocks: usize,
        first_column: usize,
    },

    #[error("Empty column name for the {column_kind} column (column {column}). {line}")]
    MissingColumnName { column_kind: &'static str, column: usize, line: ErrorLine },
}

/// Returns the value of the cell, or the empty string for cells past the end of a short row.
fn cell(record: &StringRecord, column: usize) -> &str {
    record.get(column).unwrap_or("")
}

/// Describes one horizontal `(sample name, index1, index2)` block of the index sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// The 0-based column of the sample name cell.
    pub offset: usize,
    /// The lane number the block holds samples for.
    pub lane: usize,
}

impl BlockDescriptor {
    /// Builds the descriptor for the block starting at the given column.  The lane is
    /// `round(offset / 3) + 1`.
    pub fn at(offset: usize) -> Self {
        // round-half-up of offset / 3 in integer arithmetic
        let lane = (2 * offset + BLOCK_WIDTH) / (2 * BLOCK_WIDTH) + 1;
        Self { offset, lane }
    }

    /// Builds descriptors for `num_blocks` adjacent blocks starting at `first_column`.
    pub fn layout(first_column: usize, num_blocks: usize) -> Vec<Self> {
        (0..num_blocks).map(|i| Self::at(first_column + i * BLOCK_WIDTH)).collect()
    }

    pub fn sample_name_column(&self) -> usize {
        self.offset
    }

    pub fn index1_column(&self) -> usize {
        self.offset + 1
    }

    pub fn index2_column(&self) -> usize {
        self.offset + 2
    }
}

/// A sample and its index pair for one lane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IndexRecord {
    /// The sample name as written in the sheet.
    pub sample_name: String,
    /// The index1 sequence.
    pub index1: BString,
    /// The index2 sequence, reverse complemented relative to the sheet.
    pub index2: BString,
    /// The lane implied by the block the sample was listed in.
    pub lane: String,
    /// The 1-based line in the sheet the sample was defined on.
    pub line_number: usize,
}

/// Layout options for reading an [`IndexSheet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    /// The 1-based row holding the column headers.
    pub header_row: usize,
    /// The 0-based column where the first block starts.
    pub first_block_column: usize,
    /// The number of blocks, or `None` to use every complete block in the header.
    pub num_blocks: Option<usize>,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self { header_row: 2, first_block_column: 1, num_blocks: None }
    }
}

#[derive(Debug, Clone)]
pub struct IndexSheet {
    pub blocks: Vec<BlockDescriptor>,
    pub records: Vec<IndexRecord>,
}

impl IndexSheet {
    /// Builds an `IndexSheet` from the spreadsheet export at the given path.  Files ending in
    /// `.tsv` or `.txt` are read as tab-delimited, anything else as comma-delimited.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        layout: SheetLayout,
    ) -> Result<Self, IndexSheetError> {
        let io = Io::default();
        let lines = io.read_lines(&path).map_err(IndexSheetError::FgError)?;

        if lines.iter().all(|l| l.trim().is_empty()) {
            return Err(IndexSheetError::Empty);
        }

        let delimiter = match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("tsv" | "txt") => b'\t',
            _ => b',',
        };

        let sheet = IndexSheet::from_lines(&lines, delimiter, layout)?;
        info!(
            "Read {} sample index records across {} lane block(s) from {}",
            sheet.records.len(),
            sheet.blocks.len(),
            path.as_ref().to_string_lossy()
        );
        Ok(sheet)
    }

    /// Reads the index sheet from its lines with the given delimiter.  Each line is parsed on
    /// its own so that records keep their line number in the file; blank lines are skipped.
    fn from_lines(
        lines: &[String],
        delimiter: u8,
        layout: SheetLayout,
    ) -> Result<Self, IndexSheetError> {
        let mut records: Vec<(usize, StringRecord)> = vec![];
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut reader = ReaderBuilder::new()
                .delimiter(delimiter)
                .has_headers(false)
                .quoting(true)
                .flexible(true)
                .trim(Trim::All)
                .from_reader(line.as_bytes());
            if let Some(record) = reader.records().next() {
                records.push((i + 1, record?));
            }
        }
        IndexSheet::from_string_records(&records, layout)
    }

    /// Validates the header line against the requested layout and returns the block layout.
    fn find_blocks(
        header: &StringRecord,
        line: usize,
        layout: SheetLayout,
    ) -> Result<Vec<BlockDescriptor>, IndexSheetError> {
        let available = header.len().saturating_sub(layout.first_block_column) / BLOCK_WIDTH;
        let num_blocks = layout.num_blocks.unwrap_or(available);
        let expected = layout.first_block_column + BLOCK_WIDTH * num_blocks.max(1);
        if num_blocks == 0 || num_blocks > available {
            return Err(IndexSheetError::MissingColumns {
                line,
                actual: header.len(),
                expected,
                num_blocks: num_blocks.max(1),
                first_column: layout.first_block_column,
            });
        }

        let blocks = BlockDescriptor::layout(layout.first_block_column, num_blocks);
        for block in &blocks {
            for (column_kind, column) in [
                ("sample name", block.sample_name_column()),
                ("index1", block.index1_column()),
                ("index2", block.index2_column()),
            ] {
                if header[column].is_empty() {
                    return Err(IndexSheetError::MissingColumnName {
                        column_kind,
                        column,
                        line: ErrorLine(Some(line)),
                    });
                }
            }
        }
        debug!(
            "Index sheet blocks: {}",
            blocks.iter().map(|b| format!("column {} -> lane {}", b.offset, b.lane)).join(", ")
        );
        Ok(blocks)
    }

    /// Converts the records (each paired with its 1-based line number) to index records.
    /// Samples are returned block by block, in row order within each block.
    fn from_string_records(
        records: &[(usize, StringRecord)],
        layout: SheetLayout,
    ) -> Result<Self, IndexSheetError> {
        if layout.header_row == 0 {
            return Err(IndexSheetError::InvalidHeaderRow { header_row: layout.header_row });
        }
        if records.is_empty() {
            return Err(IndexSheetError::Empty);
        }

        let header_index = match records.iter().position(|(line, _)| *line == layout.header_row)
        {
            Some(index) => index,
            None => {
                return Err(IndexSheetError::NoHeader {
                    line: layout.header_row,
                    num_lines: records.last().map_or(0, |(line, _)| *line),
                })
            }
        };
        let (header_line, header) = &records[header_index];
        let blocks = IndexSheet::find_blocks(header, *header_line, layout)?;

        let mut index_records = vec![];
        for block in &blocks {
            for (line, record) in &records[header_index + 1..] {
                let sample_name = cell(record, block.sample_name_column());
                // padding, not a sample
                if sample_name.is_empty() {
                    continue;
                }
                let index1 = normalize_index(cell(record, block.index1_column()));
                let index2 = normalize_index(cell(record, block.index2_column()));
                index_records.push(IndexRecord {
                    sample_name: sample_name.to_string(),
                    index1,
                    index2: reverse_complement(index2.as_bstr()),
                    lane: block.lane.to_string(),
                    line_number: *line,
                });
            }
        }

        Ok(IndexSheet { blocks, records: index_records })
    }
}
