use std::io::{self, BufRead, Read, Write};

use bincode::error::DecodeError;
use libcodecs::{varint8, CodecError};

use crate::error::{KmerError, Result};

/// Largest chunk accepted when decoding a length prefixed byte block
pub const MAX_CHUNK_BYTES: usize = 1024 * 1024;

/// Byte iterator over a buffered reader.
///
/// Codecs pull bytes one at a time; I/O errors end the iteration and are
/// kept so the caller can tell a failed read from end of file.
pub struct FileBytes<R>
{
    inner: R,
    error: Option<io::Error>,
}

impl<R: BufRead> FileBytes<R>
{
    pub fn new(inner: R) -> Self
    {
        FileBytes { inner, error: None }
    }

    /// Surface an I/O error seen while iterating
    fn check(&mut self) -> Result<()>
    {
        match self.error.take() {
            Some(e) => Err(KmerError::Io(e)),
            None => Ok(()),
        }
    }

    /// Run `f` over the byte stream, preferring a pending I/O error over
    /// whatever `f` made of the short input.
    pub fn with<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let res = f(self);
        self.check()?;
        res
    }

}

impl<R: BufRead> Iterator for FileBytes<R>
{
    type Item = u8;

    #[inline]
    fn next(&mut self) -> Option<u8>
    {
        if self.error.is_some() {
            return None;
        }

        loop {
            let first = match self.inner.fill_buf() {
                Ok(buf) => buf.first().copied(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.error = Some(e);
                    return None;
                }
            };

            if first.is_some() {
                self.inner.consume(1);
            }
            return first;
        }
    }
}

/// Next 8 bit varint of a byte stream, or `None` at a clean end of file
pub fn next_varint<R: BufRead>(bytes: &mut FileBytes<R>) -> Result<Option<u64>>
{
    bytes.with(|b| match varint8::decode_next(b) {
        Ok(x) => Ok(x),
        Err(CodecError::Truncated) => Err(KmerError::Truncated),
        Err(e) => Err(e.into()),
    })
}

/// Write `x` as 8 little endian bytes
pub fn write_u64_fixed<W: Write>(out: &mut W, x: u64) -> Result<()>
{
    let config = bincode::config::standard().with_fixed_int_encoding();
    bincode::encode_into_std_write(x, out, config)?;
    Ok(())
}

/// Read 8 little endian bytes, or `None` at a clean end of file
pub fn read_u64_fixed<R: Read>(inp: &mut R) -> Result<Option<u64>>
{
    let config = bincode::config::standard().with_fixed_int_encoding();
    match bincode::decode_from_std_read(inp, config) {
        Ok(x) => Ok(Some(x)),
        Err(e) if is_eof(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a byte chunk with its 8 byte length prefix
pub fn write_chunk<W: Write>(out: &mut W, chunk: &[u8]) -> Result<()>
{
    let config = bincode::config::standard().with_fixed_int_encoding();
    bincode::encode_into_std_write(chunk, out, config)?;
    Ok(())
}

/// Read a chunk written by [`write_chunk`]
pub fn read_chunk<R: Read>(inp: &mut R) -> Result<Vec<u8>>
{
    let config = bincode::config::standard()
        .with_fixed_int_encoding()
        .with_limit::<{ MAX_CHUNK_BYTES + 8 }>();
    match bincode::decode_from_std_read(inp, config) {
        Ok(chunk) => Ok(chunk),
        Err(e) if is_eof(&e) => Err(KmerError::Truncated),
        Err(e) => Err(e.into()),
    }
}

fn is_eof(e: &DecodeError) -> bool
{
    match e {
        DecodeError::UnexpectedEnd { .. } => true,
        DecodeError::Io { inner, .. } => {
            inner.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}
