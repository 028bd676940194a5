use libcodecs::CodecError;
use thiserror::Error;

use crate::meta::Meta;

pub type Result<T> = std::result::Result<T, KmerError>;

#[derive(Error, Debug)]
pub enum KmerError
{
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad cookie")]
    BadCookie,

    #[error("bad metadata tag: {0:#04x}")]
    BadMetaTag(u8),

    /// A value that has no metadata encoding
    #[error("bad metadata: {0}")]
    BadMetaData(String),

    #[error("missing metadata: {0:?}")]
    MetaDataMissing(String),

    #[error("incompatible metadata: {key} - {expected} / {actual}")]
    MetaDataIncompatible {
        key: String,
        expected: Meta,
        actual: Meta,
    },

    #[error("incompatible values of K: {0} & {1}")]
    MismatchedK(u64, u64),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("encoding error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decoding error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("input truncated")]
    Truncated,

    #[error("format error: {0}")]
    Format(String),

    #[error("values not increasing: {next} follows {prev}")]
    NotIncreasing { prev: u64, next: u64 },

    #[error("contract violation: {0}")]
    Contract(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous: several blocks match {0}")]
    Ambiguous(String),

    #[error("too many sequences for 16-bit postings: {0}")]
    TooManySequences(usize),

    #[error("FASTA error: {0}")]
    Fasta(#[from] needletail::errors::ParseError),
}
