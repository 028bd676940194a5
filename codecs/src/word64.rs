//! A 64-bit word based codec.
//!
//! The low 4 bits of each word hold the number of codes packed into it and
//! the remaining 60 bits are split into that many equal width fields:
//!
//! | codes | width |
//! |-------|-------|
//! | 1     | 60    |
//! | 2     | 30    |
//! | 3     | 20    |
//! | 4     | 15    |
//! | 5     | 12    |
//! | 6     | 10    |
//!
//! Counts of 10, 12 and 15 are also valid tags, although the greedy encoder
//! never reaches them: it flushes as soon as the next value would need a
//! count that does not divide 60. Existing files depend on this exact
//! behaviour, so the flush rule must not be changed.

use crate::CodecError;

/// Payload bits per word
pub const W: usize = 60;

const TAG_BITS: u32 = 4;
const TAG_MASK: u64 = 0xf;

/// `LOOKUP[n]` is `(width, count)` for the largest valid count `<= n`
static LOOKUP: [(u32, u32); W + 1] = build_lookup();

const fn build_lookup() -> [(u32, u32); W + 1]
{
    let mut table = [(0, 64); W + 1];
    let mut i = 1;
    while i <= W {
        if W % i == 0 {
            table[i] = ((W / i) as u32, i as u32);
        } else {
            table[i] = table[i - 1];
        }
        i += 1;
    }
    table
}

#[inline]
fn field_width(tag: u64) -> Option<u32>
{
    if tag != 0 && W as u64 % tag == 0 {
        Some((W as u64 / tag) as u32)
    } else {
        None
    }
}

#[inline]
fn bit_length(x: u64) -> u32
{
    u64::BITS - x.leading_zeros()
}

/// Pack a sequence of integers, each below `2^60`, into 64-bit words.
///
/// # Panics
/// If a value is `>= 2^60`.
pub fn encode<I>(xs: I) -> Encoder<I::IntoIter>
where
    I: IntoIterator<Item = u64>,
{
    Encoder {
        inner: xs.into_iter(),
        stack: Vec::with_capacity(W),
        max_width: 0,
    }
}

/// Unpack words produced by [`encode`]
pub fn decode<I>(words: I) -> Decoder<I::IntoIter>
where
    I: IntoIterator<Item = u64>,
{
    Decoder {
        inner: words.into_iter(),
        word: 0,
        width: 0,
        remaining: 0,
        failed: false,
    }
}

pub struct Encoder<I>
{
    inner: I,
    stack: Vec<u64>,
    max_width: u32,
}

impl<I> Encoder<I>
{
    fn flush(&mut self) -> u64
    {
        let (width, count) = LOOKUP[self.stack.len()];
        let count = count as usize;

        let mut word = 0;
        for x in self.stack[..count].iter().rev() {
            word = (word << width) | x;
        }
        word = (word << TAG_BITS) | count as u64;

        self.stack.drain(..count);
        self.max_width =
            self.stack.iter().map(|x| bit_length(*x)).max().unwrap_or(0);

        word
    }
}

impl<I> Iterator for Encoder<I>
where
    I: Iterator<Item = u64>,
{
    type Item = u64;

    fn next(&mut self) -> Option<u64>
    {
        while let Some(x) = self.inner.next() {
            assert!(x >> W == 0, "value {x} does not fit in {W} bits");

            let n = self.stack.len();
            let wx = bit_length(x);
            let needs_flush = n == W || {
                let (width, count) = LOOKUP[n + 1];
                wx.max(self.max_width) > width || n >= count as usize
            };

            if needs_flush {
                let word = self.flush();
                self.stack.push(x);
                self.max_width = self.max_width.max(wx);
                return Some(word);
            }

            self.stack.push(x);
            self.max_width = self.max_width.max(wx);
        }

        if self.stack.is_empty() {
            None
        } else {
            Some(self.flush())
        }
    }
}

pub struct Decoder<I>
{
    inner: I,
    word: u64,
    width: u32,
    remaining: u64,
    failed: bool,
}

impl<I> Iterator for Decoder<I>
where
    I: Iterator<Item = u64>,
{
    type Item = Result<u64, CodecError>;

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.failed {
            return None;
        }

        if self.remaining == 0 {
            let word = self.inner.next()?;
            let tag = word & TAG_MASK;
            self.width = match field_width(tag) {
                Some(w) => w,
                None => {
                    self.failed = true;
                    return Some(Err(CodecError::BadTag(tag)));
                }
            };
            self.word = word >> TAG_BITS;
            self.remaining = tag;
        }

        let x = self.word & ((1 << self.width) - 1);
        self.word >>= self.width;
        self.remaining -= 1;
        Some(Ok(x))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_single_values()
    {
        assert_eq!(encode(vec![0]).collect::<Vec<_>>(), vec![1]);
        assert_eq!(encode(vec![1]).collect::<Vec<_>>(), vec![17]);
        assert_eq!(
            encode(vec![(1 << 60) - 1]).collect::<Vec<_>>(),
            vec![u64::MAX - 14]
        );
    }

    #[test]
    fn test_lookup()
    {
        assert_eq!(LOOKUP[1], (60, 1));
        assert_eq!(LOOKUP[6], (10, 6));
        assert_eq!(LOOKUP[7], (10, 6));
        assert_eq!(LOOKUP[11], (6, 10));
        assert_eq!(LOOKUP[60], (1, 60));
    }

    #[test]
    fn test_greedy_packing()
    {
        // Never more than six codes per word
        let words: Vec<u64> = encode(vec![0; 100]).collect();
        assert_eq!(words.len(), 17);
        assert!(words.iter().all(|w| w & TAG_MASK <= 6));

        // A wide value forces the pending narrow ones out
        let words: Vec<u64> = encode(vec![1, 2, 3, 1 << 40]).collect();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0] & TAG_MASK, 3);
        assert_eq!(words[1] & TAG_MASK, 1);
    }

    #[test]
    fn test_roundtrip()
    {
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        let xs: Vec<u64> = (0..4000)
            .map(|_| (10.0 * rng.gen::<f64>()).exp() as u64)
            .collect();

        let words: Vec<u64> = encode(xs.iter().copied()).collect();
        assert!(words.len() < xs.len());

        let ys: Vec<u64> = decode(words).collect::<Result<_, _>>().unwrap();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_bad_tag()
    {
        let mut d = decode(vec![0x70]);
        assert_eq!(d.next(), Some(Err(CodecError::BadTag(0))));
        assert_eq!(d.next(), None);
    }

    #[test]
    #[should_panic]
    fn test_value_too_wide()
    {
        let _ = encode(vec![1 << 60]).count();
    }
}
