//! Rank/select over a sorted array of `B` bit integers.
//!
//! The top 10 bits of a value pick one of 1024 buckets, and a cumulative
//! table of bucket starts narrows each binary search to one bucket.

use crate::error::{KmerError, Result};

const BUCKET_BITS: u32 = 10;
const BUCKETS: usize = 1 << BUCKET_BITS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseSet
{
    bits: u32,
    xs: Vec<u64>,
    toc: Vec<usize>,
}

impl SparseSet
{
    /// Build over `xs`, which must be sorted with every value below
    /// `2^bits`.
    pub fn new(bits: u32, xs: Vec<u64>) -> Result<Self>
    {
        if bits == 0 || bits > 64 {
            return Err(KmerError::Contract(format!(
                "sparse set width must be 1..=64 bits, not {bits}"
            )));
        }

        let mut toc = vec![0; BUCKETS + 1];
        let mut prev = 0;
        for (i, &x) in xs.iter().enumerate() {
            if bits < 64 && x >> bits != 0 {
                return Err(KmerError::Contract(format!(
                    "{x} does not fit in {bits} bits"
                )));
            }
            if i > 0 && x < prev {
                return Err(KmerError::Contract(format!(
                    "sparse set input not sorted: {x} follows {prev}"
                )));
            }
            prev = x;
            toc[bucket(bits, x) + 1] += 1;
        }
        for i in 1..toc.len() {
            toc[i] += toc[i - 1];
        }

        Ok(SparseSet { bits, xs, toc })
    }

    /// Size of the domain, `2^bits`
    pub fn size(&self) -> u128
    {
        1 << self.bits
    }

    pub fn bits(&self) -> u32
    {
        self.bits
    }

    pub fn count(&self) -> usize
    {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.xs.is_empty()
    }

    /// Number of elements less than `x`, which is the index of `x` when it
    /// is present.
    #[inline]
    pub fn rank(&self, x: u64) -> usize
    {
        if self.bits < 64 && x >> self.bits != 0 {
            return self.xs.len();
        }

        let b = bucket(self.bits, x);
        lower_bound(&self.xs[self.toc[b]..self.toc[b + 1]], x) + self.toc[b]
    }

    /// Ranks of `x0` and `x1`, scanning forward from the first. `x1` is
    /// expected to be close above `x0`.
    pub fn rank2(&self, x0: u64, x1: u64) -> (usize, usize)
    {
        debug_assert!(x0 <= x1);
        let r0 = self.rank(x0);
        let mut r1 = r0;
        while r1 < self.xs.len() && self.xs[r1] < x1 {
            r1 += 1;
        }
        (r0, r1)
    }

    /// The `i`th smallest element. Panics unless `i < count()`.
    #[inline]
    pub fn select(&self, i: usize) -> u64
    {
        assert!(
            i < self.xs.len(),
            "select({i}) out of range for {} elements",
            self.xs.len()
        );
        self.xs[i]
    }

    /// Index of `x` if it is a member
    #[inline]
    pub fn access(&self, x: u64) -> Option<usize>
    {
        let r = self.rank(x);
        (r < self.xs.len() && self.xs[r] == x).then_some(r)
    }

    pub fn contains(&self, x: u64) -> bool
    {
        self.access(x).is_some()
    }

    pub fn as_slice(&self) -> &[u64]
    {
        &self.xs
    }

    pub fn into_inner(self) -> Vec<u64>
    {
        self.xs
    }
}

#[inline(always)]
fn bucket(bits: u32, x: u64) -> usize
{
    if bits >= BUCKET_BITS {
        (x >> (bits - BUCKET_BITS)) as usize
    } else {
        x as usize
    }
}

// Branch free lower bound: the loop runs a fixed number of times for a
// given length and the comparison only feeds a select.
#[inline(always)]
fn lower_bound(xs: &[u64], x: u64) -> usize
{
    if xs.is_empty() {
        return 0;
    }

    let mut base = 0;
    let mut size = xs.len();
    while size > 1 {
        let half = size / 2;
        let mid = base + half;
        base = if xs[mid] < x { mid } else { base };
        size -= half;
    }
    base + (xs[base] < x) as usize
}
