//! Word oriented varints: 15 payload bits per 16-bit unit. Same layout as
//! [`crate::varint8`] with wider groups, so large deltas take fewer units.

use crate::CodecError;

const PAYLOAD_BITS: u32 = 15;
const PAYLOAD_MASK: u64 = 0x7fff;
const CONTINUE: u16 = 0x8000;

#[inline]
pub const fn encoded_len(x: u64) -> usize
{
    let bits = u64::BITS - x.leading_zeros();
    if bits == 0 {
        1
    } else {
        bits.div_ceil(PAYLOAD_BITS) as usize
    }
}

pub fn encode(x: u64) -> Vec<u16>
{
    let mut buf = Vec::with_capacity(encoded_len(x));
    encode_into(x, &mut buf);
    buf
}

/// Append the encoding of `x` to an existing buffer, growing it in place
#[inline]
pub fn encode_into(x: u64, buf: &mut Vec<u16>)
{
    let n = encoded_len(x);
    let start = buf.len();
    buf.resize(start + n, 0);

    // Fill from the least significant group backwards
    let mut x = x;
    let mut flag = 0;
    for unit in buf[start..].iter_mut().rev() {
        *unit = (x & PAYLOAD_MASK) as u16 | flag;
        x >>= PAYLOAD_BITS;
        flag = CONTINUE;
    }
}

#[inline]
pub fn decode_next<I>(itr: &mut I) -> Result<Option<u64>, CodecError>
where
    I: Iterator<Item = u16>,
{
    let mut unit = match itr.next() {
        Some(u) => u,
        None => return Ok(None),
    };

    let mut x = unit as u64 & PAYLOAD_MASK;
    while unit & CONTINUE != 0 {
        unit = itr.next().ok_or(CodecError::Truncated)?;
        if x >> (u64::BITS - PAYLOAD_BITS) != 0 {
            return Err(CodecError::Overflow);
        }
        x = (x << PAYLOAD_BITS) | (unit as u64 & PAYLOAD_MASK);
    }

    Ok(Some(x))
}

#[inline]
pub fn decode<I>(itr: &mut I) -> Result<u64, CodecError>
where
    I: Iterator<Item = u16>,
{
    decode_next(itr)?.ok_or(CodecError::EndOfInput)
}
