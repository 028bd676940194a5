//! Block chunked vectors of fixed width integers.
//!
//! A vector is a run of chunks, each an 8 byte little endian byte length
//! followed by that many bytes of little endian elements, ending with an
//! empty chunk. Chunks hold at most [`CHUNK_ELEMENTS`] elements, so readers
//! never need more than one chunk in memory.

use std::{
    fmt::Debug,
    io::{Read, Seek, SeekFrom, Write},
    marker::PhantomData,
};

use crate::{
    error::{KmerError, Result},
    utils::{read_chunk, read_u64_fixed, write_chunk, MAX_CHUNK_BYTES},
};

pub const CHUNK_ELEMENTS: usize = 65536;

/// Fixed width element of a block vector
pub trait Element: Copy + Debug + 'static
{
    const WIDTH: usize;

    fn put(self, buf: &mut Vec<u8>);
    fn get(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($t:ty) => {
        impl Element for $t
        {
            const WIDTH: usize = std::mem::size_of::<$t>();

            #[inline]
            fn put(self, buf: &mut Vec<u8>)
            {
                buf.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn get(bytes: &[u8]) -> Self
            {
                let mut raw = [0; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }
        }
    };
}

impl_element!(u16);
impl_element!(u32);
impl_element!(u64);

/// Push style writer for one vector
pub struct VectorWriter<'a, W: Write, T: Element>
{
    out: &'a mut W,
    buf: Vec<u8>,
    chunk_elements: usize,
    count: u64,
    finished: bool,
    _marker: PhantomData<T>,
}

impl<'a, W: Write, T: Element> VectorWriter<'a, W, T>
{
    pub fn new(out: &'a mut W) -> Self
    {
        VectorWriter {
            out,
            buf: Vec::with_capacity(CHUNK_ELEMENTS * T::WIDTH),
            chunk_elements: CHUNK_ELEMENTS,
            count: 0,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Configuration. Elements per chunk, clamped to `1..=CHUNK_ELEMENTS`.
    pub fn with_chunk_elements(mut self, chunk_elements: usize) -> Self
    {
        self.chunk_elements = chunk_elements.clamp(1, CHUNK_ELEMENTS);
        self
    }

    #[inline]
    pub fn push(&mut self, x: T) -> Result<()>
    {
        x.put(&mut self.buf);
        self.count += 1;
        if self.buf.len() == self.chunk_elements * T::WIDTH {
            self.flush_chunk()?;
        }
        Ok(())
    }

    pub fn len(&self) -> u64
    {
        self.count
    }

    pub fn is_empty(&self) -> bool
    {
        self.count == 0
    }

    fn flush_chunk(&mut self) -> Result<()>
    {
        if !self.buf.is_empty() {
            write_chunk(self.out, &self.buf)?;
            log::debug!(
                "Wrote chunk of {} elements",
                self.buf.len() / T::WIDTH
            );
            self.buf.clear();
        }
        Ok(())
    }

    /// Write the final chunk and the terminator, returning the element count
    pub fn finish(mut self) -> Result<u64>
    {
        self.finish_inner()?;
        Ok(self.count)
    }

    fn finish_inner(&mut self) -> Result<()>
    {
        self.finished = true;
        self.flush_chunk()?;
        write_chunk(self.out, &[])
    }
}

impl<W: Write, T: Element> Drop for VectorWriter<'_, W, T>
{
    fn drop(&mut self)
    {
        if !self.finished {
            if let Err(e) = self.finish_inner() {
                log::error!("Unable to finish vector on drop: {e}");
            }
        }
    }
}

/// Write all of `values` as one vector, returning the element count
pub fn write_vector<W, T, I>(out: &mut W, values: I) -> Result<u64>
where
    W: Write,
    T: Element,
    I: IntoIterator<Item = T>,
{
    write_vector_chunked(out, values, CHUNK_ELEMENTS)
}

pub fn write_vector_chunked<W, T, I>(
    out: &mut W,
    values: I,
    chunk_elements: usize,
) -> Result<u64>
where
    W: Write,
    T: Element,
    I: IntoIterator<Item = T>,
{
    let mut writer =
        VectorWriter::<W, T>::new(out).with_chunk_elements(chunk_elements);
    for x in values {
        writer.push(x)?;
    }
    writer.finish()
}

/// Lazy, forward only reader producing exactly `count` elements
pub struct VectorReader<R, T>
{
    inp: R,
    chunk: Vec<u8>,
    pos: usize,
    remaining: u64,
    failed: bool,
    _marker: PhantomData<T>,
}

pub fn read_vector<R: Read, T: Element>(inp: R, count: u64) -> VectorReader<R, T>
{
    VectorReader {
        inp,
        chunk: Vec::new(),
        pos: 0,
        remaining: count,
        failed: false,
        _marker: PhantomData,
    }
}

impl<R: Read, T: Element> VectorReader<R, T>
{
    /// Elements still to come
    pub fn remaining(&self) -> u64
    {
        self.remaining
    }

    fn next_chunk(&mut self) -> Result<()>
    {
        let chunk = read_chunk(&mut self.inp)?;
        if chunk.is_empty() {
            return Err(KmerError::Truncated);
        }
        if chunk.len() % T::WIDTH != 0 {
            return Err(KmerError::Format(format!(
                "chunk of {} bytes is not a multiple of {}",
                chunk.len(),
                T::WIDTH
            )));
        }
        self.chunk = chunk;
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read, T: Element> Iterator for VectorReader<R, T>
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>>
    {
        if self.remaining == 0 || self.failed {
            return None;
        }

        if self.pos == self.chunk.len() {
            if let Err(e) = self.next_chunk() {
                self.failed = true;
                return Some(Err(e));
            }
        }

        let x = T::get(&self.chunk[self.pos..self.pos + T::WIDTH]);
        self.pos += T::WIDTH;
        self.remaining -= 1;
        Some(Ok(x))
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        if self.failed {
            (0, Some(0))
        } else {
            (0, usize::try_from(self.remaining).ok())
        }
    }
}

/// Seek past a vector of `width` byte elements, returning its length.
/// Chunks are held to the same size limit the reader applies.
pub fn skip_vector<R: Read + Seek>(inp: &mut R, width: usize) -> Result<u64>
{
    let mut count: u64 = 0;
    loop {
        let len = read_u64_fixed(inp)?.ok_or(KmerError::Truncated)?;
        if len == 0 {
            return Ok(count);
        }
        if len > MAX_CHUNK_BYTES as u64 {
            return Err(KmerError::Format(format!(
                "chunk of {len} bytes exceeds {MAX_CHUNK_BYTES}"
            )));
        }
        if len % width as u64 != 0 {
            return Err(KmerError::Format(format!(
                "chunk of {len} bytes is not a multiple of {width}"
            )));
        }
        inp.seek(SeekFrom::Current(len as i64))?;
        count = count
            .checked_add(len / width as u64)
            .ok_or_else(|| KmerError::Format("element count overflows".into()))?;
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;
    use std::io::Cursor;

    #[test]
    fn test_rw_64()
    {
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        let m: u64 = (1 << 54) - 1;
        let xs: Vec<u64> = (0..100_000).map(|_| rng.gen_range(0..=m)).collect();

        let mut buf = Vec::new();
        let n = write_vector(&mut buf, xs.iter().copied()).unwrap();
        assert_eq!(n, xs.len() as u64);

        let ys: Vec<u64> = read_vector(Cursor::new(&buf), n)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(xs, ys);

        // 100_000 elements is two chunks plus the terminator
        let mut inp = Cursor::new(&buf);
        assert_eq!(skip_vector(&mut inp, 8).unwrap(), n);
        assert_eq!(inp.position(), buf.len() as u64);
        assert_eq!(buf.len(), 100_000 * 8 + 3 * 8);
    }

    #[test]
    fn test_writer_push()
    {
        let mut buf = Vec::new();
        {
            let mut w = VectorWriter::<_, u16>::new(&mut buf)
                .with_chunk_elements(10);
            for x in 0..25_u16 {
                w.push(x).unwrap();
            }
            assert_eq!(w.len(), 25);
            assert_eq!(w.finish().unwrap(), 25);
        }

        let ys: Vec<u16> = read_vector(Cursor::new(&buf), 25)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(ys, (0..25).collect::<Vec<_>>());
        assert_eq!(skip_vector(&mut Cursor::new(&buf), 2).unwrap(), 25);
    }

    #[test]
    fn test_writer_finishes_on_drop()
    {
        let mut buf = Vec::new();
        {
            let mut w = VectorWriter::<_, u32>::new(&mut buf);
            w.push(7).unwrap();
            w.push(9).unwrap();
        }
        assert_eq!(skip_vector(&mut Cursor::new(&buf), 4).unwrap(), 2);
    }

    #[test]
    fn test_partial_and_short_reads()
    {
        let mut buf = Vec::new();
        write_vector(&mut buf, (0..100_u32).collect::<Vec<_>>()).unwrap();

        // Abandoning part way is fine
        let first: Vec<u32> = read_vector(Cursor::new(&buf), 100)
            .take(3)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(first, vec![0, 1, 2]);

        // Asking for more than was written is not
        let res: Result<Vec<u32>> = read_vector(Cursor::new(&buf), 101).collect();
        assert!(matches!(res, Err(KmerError::Truncated)));
    }

    #[test]
    fn test_empty_vector()
    {
        let mut buf = Vec::new();
        assert_eq!(write_vector(&mut buf, Vec::<u64>::new()).unwrap(), 0);
        assert_eq!(buf.len(), 8);
        assert_eq!(read_vector::<_, u64>(Cursor::new(&buf), 0).count(), 0);
    }
}
