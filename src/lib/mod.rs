//! A library for preparing single-cell sequencing submissions.
//!
//! # Overview
//!
//! The flow of data is as follows:
//!
//! - The [`index_sheet::IndexSheet`] reads the laboratory's sample index spreadsheet export into
//!   [`index_sheet::IndexRecord`]s, one per sample per lane block.
//! - A [`fastq::FastqSource`] discovers the sequencing files, inferring the index pair and lane of
//!   each [`fastq::FastqRecord`] from its file name.
//! - [`reconcile::reconcile`] joins the two on `(index1, index2, lane)`, reporting what did not
//!   match in either direction.
//! - [`manifest::build_manifests`] pivots the matches into one R1/R2/I1/I2 manifest per sample,
//!   and the [`manifest::ManifestWriter`] writes them to their destinations.
//! - The [`sample_sheet::PublishedSheet`] pivots the written manifests into one row per sample
//!   stem and publishes it.
//! - Anomalies found along the way are collected in a [`review::ReviewReport`] for the operator.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod classify;
pub mod fastq;
pub mod index_sheet;
pub mod manifest;
pub mod opts;
pub mod reconcile;
pub mod review;
pub mod run;
pub mod sample_sheet;
pub mod utils;
