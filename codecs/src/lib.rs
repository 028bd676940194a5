//! Integer codecs shared by the k-mer containers.
//!
//! * [`varint8`] - 7 data bits per byte, continuation in the top bit
//! * [`varint16`] - 15 data bits per 16-bit word, continuation in the top bit
//! * [`word64`] - several small integers packed into one 64-bit word

pub mod varint16;
pub mod varint8;
pub mod word64;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError
{
    /// No units were available when a value was expected
    #[error("end of input")]
    EndOfInput,

    /// The input ran out part way through a value
    #[error("input truncated inside a variable length integer")]
    Truncated,

    /// The value does not fit in 64 bits
    #[error("variable length integer overflows 64 bits")]
    Overflow,

    /// A packed word carried a tag that is not a valid field count
    #[error("bad packed word tag: {0}")]
    BadTag(u64),
}
