//! Self describing metadata values.
//!
//! Every value starts with a one byte tag which fully determines how the
//! rest is decoded. Integers and lengths are [`varint8`] encoded.
//!
//! | tag | value |
//! |-----|-------|
//! | `Z` | non-negative integer |
//! | `z` | negative integer (magnitude follows) |
//! | `F` `G` | non-negative float, exponent `>= 0` / `< 0` |
//! | `f` `g` | negative float, exponent `>= 0` / `< 0` |
//! | `S` | length prefixed UTF-8 string |
//! | `T` | count prefixed tuple |
//! | `D` | count prefixed map of string keys to values |
//!
//! Floats are stored as a mantissa scaled to 40 bits and a binary exponent,
//! so values of the form `m * 2^e` with a 40-bit `m` round trip exactly.

use std::{collections::BTreeMap, fmt, io::Write};

use libcodecs::{varint8, CodecError};

use crate::error::{KmerError, Result};

pub type MetaMap = BTreeMap<String, Meta>;

const MANTISSA_BITS: i32 = 40;
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub enum Meta
{
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<Meta>),
    Map(MetaMap),

    /// Wildcard for [`check_meta`]: the key must exist, any value will do.
    /// Cannot be encoded.
    Any,
}

impl PartialEq for Meta
{
    fn eq(&self, other: &Self) -> bool
    {
        use Meta::*;
        match (self, other) {
            (UInt(a), UInt(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), Int(b)) | (Int(b), UInt(a)) => {
                *b >= 0 && *a == *b as u64
            }
            (Float(a), Float(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Tuple(a), Tuple(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (Any, Any) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Meta
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Meta::UInt(x) => write!(f, "{x}"),
            Meta::Int(x) => write!(f, "{x}"),
            Meta::Float(x) => write!(f, "{x}"),
            Meta::Str(s) => write!(f, "{s:?}"),
            Meta::Tuple(xs) => {
                write!(f, "(")?;
                for (i, x) in xs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, ")")
            }
            Meta::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
            Meta::Any => write!(f, "*"),
        }
    }
}

impl Meta
{
    /// Unsigned view of an integer value
    pub fn as_u64(&self) -> Option<u64>
    {
        match self {
            Meta::UInt(x) => Some(*x),
            Meta::Int(x) if *x >= 0 => Some(*x as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64>
    {
        match self {
            Meta::Int(x) => Some(*x),
            Meta::UInt(x) => i64::try_from(*x).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64>
    {
        match self {
            Meta::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str>
    {
        match self {
            Meta::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Meta]>
    {
        match self {
            Meta::Tuple(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MetaMap>
    {
        match self {
            Meta::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_any(&self) -> bool
    {
        matches!(self, Meta::Any)
    }
}

impl From<u64> for Meta
{
    fn from(x: u64) -> Self
    {
        Meta::UInt(x)
    }
}

impl From<u32> for Meta
{
    fn from(x: u32) -> Self
    {
        Meta::UInt(x as u64)
    }
}

impl From<usize> for Meta
{
    fn from(x: usize) -> Self
    {
        Meta::UInt(x as u64)
    }
}

impl From<i64> for Meta
{
    fn from(x: i64) -> Self
    {
        if x >= 0 {
            Meta::UInt(x as u64)
        } else {
            Meta::Int(x)
        }
    }
}

impl From<i32> for Meta
{
    fn from(x: i32) -> Self
    {
        Meta::from(x as i64)
    }
}

impl From<f64> for Meta
{
    fn from(x: f64) -> Self
    {
        Meta::Float(x)
    }
}

impl From<&str> for Meta
{
    fn from(s: &str) -> Self
    {
        Meta::Str(s.to_string())
    }
}

impl From<String> for Meta
{
    fn from(s: String) -> Self
    {
        Meta::Str(s)
    }
}

impl<T: Into<Meta>> From<Vec<T>> for Meta
{
    fn from(xs: Vec<T>) -> Self
    {
        Meta::Tuple(xs.into_iter().map(Into::into).collect())
    }
}

impl From<MetaMap> for Meta
{
    fn from(m: MetaMap) -> Self
    {
        Meta::Map(m)
    }
}

/// Build a [`MetaMap`] from `key => value` pairs
#[macro_export]
macro_rules! meta_map {
    () => {
        $crate::meta::MetaMap::new()
    };
    ($($k:expr => $v:expr),+ $(,)?) => {{
        let mut m = $crate::meta::MetaMap::new();
        $(
            m.insert(::std::string::String::from($k), $crate::meta::Meta::from($v));
        )+
        m
    }};
}

/// Split a positive, finite `x` into `(m, e)` with `m` in `[0.5, 1)` and
/// `x == m * 2^e`.
fn frexp(x: f64) -> (f64, i32)
{
    if x == 0.0 {
        return (0.0, 0);
    }

    let bits = x.to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i32;
    if exp == 0 {
        // Subnormal, normalise first
        let (m, e) = frexp(x * 2f64.powi(64));
        return (m, e - 64);
    }

    let m = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (m, exp - 1022)
}

fn ldexp(x: f64, e: i64) -> f64
{
    // Anything outside this range is already 0 or infinite
    let mut e = e.clamp(-2200, 2200);
    let mut x = x;
    while e > 1000 {
        x *= 2f64.powi(1000);
        e -= 1000;
    }
    while e < -1000 {
        x *= 2f64.powi(-1000);
        e += 1000;
    }
    x * 2f64.powi(e as i32)
}

fn put_float(buf: &mut Vec<u8>, x: f64)
{
    let negative = x.is_sign_negative() && x != 0.0;
    let (m, e) = frexp(x.abs());
    let m = (m * 2f64.powi(MANTISSA_BITS)) as u64;
    let e = e - MANTISSA_BITS;

    let tag = match (negative, e >= 0) {
        (false, true) => b'F',
        (false, false) => b'G',
        (true, true) => b'f',
        (true, false) => b'g',
    };
    buf.push(tag);
    varint8::encode_into(m, buf);
    varint8::encode_into(e.unsigned_abs() as u64, buf);
}

fn put_str(buf: &mut Vec<u8>, s: &str)
{
    buf.push(b'S');
    varint8::encode_into(s.len() as u64, buf);
    buf.extend_from_slice(s.as_bytes());
}

/// Append the encoding of `item` to `buf`
pub fn encode_meta_into(buf: &mut Vec<u8>, item: &Meta) -> Result<()>
{
    match item {
        Meta::UInt(x) => {
            buf.push(b'Z');
            varint8::encode_into(*x, buf);
        }
        Meta::Int(x) => {
            buf.push(if *x >= 0 { b'Z' } else { b'z' });
            varint8::encode_into(x.unsigned_abs(), buf);
        }
        Meta::Float(x) => {
            if !x.is_finite() {
                return Err(KmerError::BadMetaData(format!("{x}")));
            }
            put_float(buf, *x);
        }
        Meta::Str(s) => put_str(buf, s),
        Meta::Tuple(xs) => {
            buf.push(b'T');
            varint8::encode_into(xs.len() as u64, buf);
            for x in xs {
                encode_meta_into(buf, x)?;
            }
        }
        Meta::Map(m) => {
            buf.push(b'D');
            varint8::encode_into(m.len() as u64, buf);
            for (k, v) in m {
                put_str(buf, k);
                encode_meta_into(buf, v)?;
            }
        }
        Meta::Any => {
            return Err(KmerError::BadMetaData(
                "wildcard values cannot be stored".to_string(),
            ))
        }
    }
    Ok(())
}

pub fn encode_meta(item: &Meta) -> Result<Vec<u8>>
{
    let mut buf = Vec::new();
    encode_meta_into(&mut buf, item)?;
    Ok(buf)
}

/// Write the encoding of `item` to `out`
pub fn put_meta<W: Write>(out: &mut W, item: &Meta) -> Result<()>
{
    let buf = encode_meta(item)?;
    out.write_all(&buf)?;
    Ok(())
}

/// Decode one value from a byte stream
pub fn get_meta<I>(itr: &mut I) -> Result<Meta>
where
    I: Iterator<Item = u8>,
{
    get_meta_at_depth(itr, 0)
}

fn get_meta_at_depth<I>(itr: &mut I, depth: usize) -> Result<Meta>
where
    I: Iterator<Item = u8>,
{
    if depth > MAX_DEPTH {
        return Err(KmerError::Format("metadata nested too deeply".into()));
    }

    let tag = itr.next().ok_or(KmerError::Truncated)?;
    let item = match tag {
        b'Z' => Meta::UInt(get_varint(itr)?),
        b'z' => {
            let x = get_varint(itr)?;
            if x > i64::MAX as u64 + 1 {
                return Err(KmerError::Format(format!(
                    "negative integer out of range: -{x}"
                )));
            }
            Meta::Int((x as i64).wrapping_neg())
        }
        b'F' | b'G' | b'f' | b'g' => {
            let m = get_varint(itr)? as f64;
            let e = get_varint(itr)?.min(i64::MAX as u64) as i64;
            let e = if tag == b'G' || tag == b'g' { -e } else { e };
            let x = ldexp(m, e);
            Meta::Float(if tag == b'f' || tag == b'g' { -x } else { x })
        }
        b'S' => Meta::Str(get_string(itr)?),
        b'T' => {
            let n = get_varint(itr)?;
            let mut xs = Vec::new();
            for _ in 0..n {
                xs.push(get_meta_at_depth(itr, depth + 1)?);
            }
            Meta::Tuple(xs)
        }
        b'D' => {
            let n = get_varint(itr)?;
            let mut m = MetaMap::new();
            for _ in 0..n {
                let k = match get_meta_at_depth(itr, depth + 1)? {
                    Meta::Str(k) => k,
                    other => {
                        return Err(KmerError::Format(format!(
                            "metadata map key is not a string: {other}"
                        )))
                    }
                };
                let v = get_meta_at_depth(itr, depth + 1)?;
                m.insert(k, v);
            }
            Meta::Map(m)
        }
        _ => return Err(KmerError::BadMetaTag(tag)),
    };
    Ok(item)
}

/// Metadata varint; running out of bytes is [`KmerError::Truncated`]
/// wherever it happens.
fn get_varint<I>(itr: &mut I) -> Result<u64>
where
    I: Iterator<Item = u8>,
{
    match varint8::decode(itr) {
        Ok(x) => Ok(x),
        Err(CodecError::EndOfInput | CodecError::Truncated) => Err(KmerError::Truncated),
        Err(e) => Err(e.into()),
    }
}

fn get_string<I>(itr: &mut I) -> Result<String>
where
    I: Iterator<Item = u8>,
{
    let len = get_varint(itr)?;
    let mut bytes = Vec::with_capacity(len.min(4096) as usize);
    for _ in 0..len {
        bytes.push(itr.next().ok_or(KmerError::Truncated)?);
    }
    String::from_utf8(bytes)
        .map_err(|e| KmerError::Format(format!("metadata string: {e}")))
}

/// Check that every key of `required` is present in `actual` and, unless
/// the required value is [`Meta::Any`], holds an equal value.
pub fn check_meta(required: &MetaMap, actual: &MetaMap) -> Result<()>
{
    for (k, v) in required {
        let found = match actual.get(k) {
            Some(found) => found,
            None => return Err(KmerError::MetaDataMissing(k.clone())),
        };
        if !v.is_any() && v != found {
            return Err(KmerError::MetaDataIncompatible {
                key: k.clone(),
                expected: v.clone(),
                actual: found.clone(),
            });
        }
    }
    Ok(())
}

/// Add the entries of `extra` to `base`. A key already in `base` with a
/// different value is an error.
pub fn merge_meta(base: &mut MetaMap, extra: &MetaMap) -> Result<()>
{
    for (k, v) in extra {
        match base.get(k) {
            Some(existing) if existing != v => {
                return Err(KmerError::MetaDataIncompatible {
                    key: k.clone(),
                    expected: existing.clone(),
                    actual: v.clone(),
                });
            }
            _ => {
                base.insert(k.clone(), v.clone());
            }
        }
    }
    Ok(())
}

/// Fetch an unsigned integer entry
pub fn meta_u64(m: &MetaMap, key: &str) -> Result<u64>
{
    let v = m
        .get(key)
        .ok_or_else(|| KmerError::MetaDataMissing(key.to_string()))?;
    v.as_u64().ok_or_else(|| {
        KmerError::Format(format!("metadata {key} is not an integer: {v}"))
    })
}

/// Fetch a string entry
pub fn meta_str<'a>(m: &'a MetaMap, key: &str) -> Result<&'a str>
{
    let v = m
        .get(key)
        .ok_or_else(|| KmerError::MetaDataMissing(key.to_string()))?;
    v.as_str().ok_or_else(|| {
        KmerError::Format(format!("metadata {key} is not a string: {v}"))
    })
}
