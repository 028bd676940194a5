//! 2 bit k-mer packing: `A=0, C=1, G=2, T=3`, first base in the most
//! significant position.

#[inline(always)]
fn base(c: u8) -> Option<u64>
{
    match c {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' | b'U' | b'u' => Some(3),
        _ => None,
    }
}

#[inline(always)]
fn mask(k: usize) -> u64
{
    if k >= 32 {
        u64::MAX
    } else {
        (1 << (2 * k)) - 1
    }
}

/// Pack a whole sequence, or `None` if it holds anything but ACGTU or is
/// longer than 32 bases.
pub fn kmer(seq: &[u8]) -> Option<u64>
{
    if seq.len() > 32 {
        return None;
    }
    seq.iter()
        .try_fold(0_u64, |x, &c| base(c).map(|b| (x << 2) | b))
}

/// Spell out the `k`-mer `x`.
///
/// Panics unless `k` is in `1..=32`.
pub fn render(k: usize, x: u64) -> String
{
    assert!((1..=32).contains(&k), "k must be in 1..=32, not {k}");
    (0..k)
        .rev()
        .map(|i| b"ACGT"[((x >> (2 * i)) & 3) as usize] as char)
        .collect()
}

/// Reverse complement of the `k`-mer `x`
#[inline]
pub fn rc(k: usize, x: u64) -> u64
{
    debug_assert!((1..=32).contains(&k));
    let mut y = !x;
    y = ((y >> 2) & 0x3333_3333_3333_3333) | ((y & 0x3333_3333_3333_3333) << 2);
    y = ((y >> 4) & 0x0f0f_0f0f_0f0f_0f0f) | ((y & 0x0f0f_0f0f_0f0f_0f0f) << 4);
    y.swap_bytes() >> (64 - 2 * k)
}

/// Sliding window k-mers of `seq`. Windows covering anything other than
/// ACGTU are skipped. With `both_strands` each k-mer is followed by its
/// reverse complement.
///
/// Panics unless `k` is in `1..=32`.
pub fn kmers(k: usize, seq: &[u8], both_strands: bool) -> Kmers<'_>
{
    assert!((1..=32).contains(&k), "k must be in 1..=32, not {k}");
    Kmers {
        k,
        seq,
        both_strands,
        i: 0,
        j: 0,
        x: 0,
        xb: 0,
        pending: None,
    }
}

pub struct Kmers<'a>
{
    k: usize,
    seq: &'a [u8],
    both_strands: bool,
    i: usize,
    j: usize,
    x: u64,
    xb: u64,
    pending: Option<u64>,
}

impl Iterator for Kmers<'_>
{
    type Item = u64;

    fn next(&mut self) -> Option<u64>
    {
        if let Some(xb) = self.pending.take() {
            return Some(xb);
        }

        let z = self.seq.len();
        let s = 2 * (self.k - 1);
        while self.i + self.k <= z {
            while self.i + self.j < z && self.j < self.k {
                match base(self.seq[self.i + self.j]) {
                    Some(b) => {
                        self.x = (self.x << 2) | b;
                        self.xb = (self.xb >> 2) | ((3 - b) << s);
                        self.j += 1;
                    }
                    None => {
                        self.i += self.j + 1;
                        self.j = 0;
                        self.x = 0;
                        self.xb = 0;
                    }
                }
            }

            if self.j == self.k {
                self.x &= mask(self.k);
                self.j -= 1;
                self.i += 1;
                if self.both_strands {
                    self.pending = Some(self.xb);
                }
                return Some(self.x);
            }
            self.i += 1;
        }
        None
    }
}
