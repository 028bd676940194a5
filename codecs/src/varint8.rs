//! Byte oriented varints: 7 payload bits per byte, most significant group
//! first, continuation flag in the top bit of every byte but the last.

use crate::CodecError;

const PAYLOAD_BITS: u32 = 7;
const PAYLOAD_MASK: u64 = 0x7f;
const CONTINUE: u8 = 0x80;

/// Number of bytes needed to encode `x`
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

/// Encode `x` into a freshly allocated vector
pub fn encode(x: u64) -> Vec<u8>
{
    let mut buf = Vec::with_capacity(encoded_len(x));
    encode_into(x, &mut buf);
    buf
}

/// Append the encoding of `x` to `buf`. Output is identical to [`encode`].
#[inline]
pub fn encode_into(x: u64, buf: &mut Vec<u8>)
{
    let n = encoded_len(x);
    for i in (0..n).rev() {
        let group = ((x >> (PAYLOAD_BITS as usize * i)) & PAYLOAD_MASK) as u8;
        if i > 0 {
            buf.push(group | CONTINUE);
        } else {
            buf.push(group);
        }
    }
}

/// Decode the next value, or `Ok(None)` if the input is exhausted before the
/// first byte. Running out of input part way through a value is an error.
#[inline]
pub fn decode_next<I>(itr: &mut I) -> Result<Option<u64>, CodecError>
where
    I: Iterator<Item = u8>,
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

/// Decode one value; an empty input is [`CodecError::EndOfInput`]
#[inline]
pub fn decode<I>(itr: &mut I) -> Result<u64, CodecError>
where
    I: Iterator<Item = u8>,
{
    decode_next(itr)?.ok_or(CodecError::EndOfInput)
}
