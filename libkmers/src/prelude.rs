pub use crate::{
    casket::{CasketReader, CasketWriter, Region},
    container::{probe, Container, TcfWriter},
    error::{KmerError, Result},
    index::{build_index, build_index_from_fasta, index, KmerIndex},
    kmers::{kmer, kmers, rc, render},
    meta::{check_meta, Meta, MetaMap},
    meta_map,
    parameters::IndexParameters,
    sparse::SparseSet,
};
pub use libcodecs::CodecError;
