//! Compact storage and indexing for sorted sets of k-mers.
//!
//! Sets are delta coded with [`libcodecs`] varints inside the TCF
//! [`container`] format, kept as fixed width block [`vectors`], or left
//! uncompressed in an [`exset`] when they are small.
//! [`sparse::SparseSet`] answers rank/select queries over a loaded set and
//! [`index::KmerIndex`] maps k-mers back to the sequences holding them.

pub mod casket;
pub mod container;
pub mod error;
pub mod exset;
pub mod index;
pub mod kfset;
pub mod kmer_vectors;
pub mod kmers;
pub mod kset;
pub mod meta;
pub mod parameters;
pub mod prelude;
pub mod sparse;
pub mod utils;
pub mod vectors;

pub use crate::error::{KmerError, Result};
