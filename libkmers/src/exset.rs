//! Uncompressed k-mer sets for small inputs, where decoding varints costs
//! more than it saves.
//!
//! The file is `K` and `N` as 8 byte little endian words followed by the
//! `N` k-mers in the same form. There is no container header.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use crate::{
    error::{KmerError, Result},
    meta::MetaMap,
    meta_map,
    utils::{read_u64_fixed, write_u64_fixed},
    vectors::Element,
};

const HEADER_BYTES: u64 = 16;

/// Write the strictly increasing k-mers `xs` to `path`. Ordering is checked
/// before the file is created.
pub fn write<P: AsRef<Path>>(k: u64, xs: &[u64], path: P) -> Result<u64>
{
    if let Some(w) = xs.windows(2).find(|w| w[1] <= w[0]) {
        return Err(KmerError::NotIncreasing { prev: w[0], next: w[1] });
    }

    let mut out = BufWriter::new(File::create(path.as_ref())?);
    write_u64_fixed(&mut out, k)?;
    write_u64_fixed(&mut out, xs.len() as u64)?;
    for &x in xs {
        write_u64_fixed(&mut out, x)?;
    }
    out.flush()?;

    log::debug!("Wrote {} uncompressed {k}-mers to {}", xs.len(), path.as_ref().display());
    Ok(xs.len() as u64)
}

fn read_header<R: Read>(inp: &mut R) -> Result<(u64, u64)>
{
    let k = read_u64_fixed(inp)?.ok_or(KmerError::Truncated)?;
    let n = read_u64_fixed(inp)?.ok_or(KmerError::Truncated)?;
    Ok((k, n))
}

/// Read the whole set, returning `{K}` and the k-mers
pub fn read<P: AsRef<Path>>(path: P) -> Result<(MetaMap, Vec<u64>)>
{
    let file = File::open(path.as_ref())?;
    let file_len = file.metadata()?.len();
    let mut inp = BufReader::new(file);
    let (k, n) = read_header(&mut inp)?;

    let body = n
        .checked_mul(u64::WIDTH as u64)
        .ok_or_else(|| KmerError::Format(format!("set of {n} k-mers is too large")))?;
    match file_len.checked_sub(HEADER_BYTES) {
        Some(len) if len == body => (),
        Some(len) if len < body => return Err(KmerError::Truncated),
        _ => {
            return Err(KmerError::Format(format!(
                "{file_len} bytes cannot hold exactly {n} k-mers"
            )))
        }
    }

    let mut raw = vec![0; body as usize];
    inp.read_exact(&mut raw)?;
    let xs: Vec<u64> = raw.chunks_exact(u64::WIDTH).map(u64::get).collect();

    Ok((meta_map! { "K" => k }, xs))
}

pub fn probe_k<P: AsRef<Path>>(path: P) -> Result<u64>
{
    let mut inp = BufReader::new(File::open(path.as_ref())?);
    Ok(read_header(&mut inp)?.0)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::{kset, meta::meta_u64};

    #[test]
    fn test_round_trip()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xs.exset");

        let xs = vec![0, 3, 255, 1 << 40, u64::MAX];
        assert_eq!(write(27, &xs, &path).unwrap(), 5);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16 + 5 * 8);

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..8], &27_u64.to_le_bytes());
        assert_eq!(&raw[8..16], &5_u64.to_le_bytes());

        let (meta, ys) = read(&path).unwrap();
        assert_eq!(meta_u64(&meta, "K").unwrap(), 27);
        assert_eq!(ys, xs);
        assert_eq!(probe_k(&path).unwrap(), 27);

        write(5, &[], &path).unwrap();
        assert_eq!(read(&path).unwrap().1, Vec::<u64>::new());
    }

    #[test]
    fn test_same_kmers_as_kset()
    {
        let dir = tempfile::tempdir().unwrap();
        let kpath = dir.path().join("a.kset");
        let epath = dir.path().join("a.exset");

        let xs: Vec<u64> = (0..1000).map(|i| i * i + 7).collect();
        kset::write(21, xs.clone(), &kpath, None).unwrap();
        write(21, &xs, &epath).unwrap();

        let ks: Vec<u64> = kset::read(&kpath).unwrap().1.collect::<Result<_>>().unwrap();
        assert_eq!(read(&epath).unwrap().1, ks);
        assert!(std::fs::metadata(&kpath).unwrap().len() < std::fs::metadata(&epath).unwrap().len());
    }

    #[test]
    fn test_bad_files()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.exset");

        assert!(matches!(
            write(4, &[1, 5, 5], &path),
            Err(KmerError::NotIncreasing { prev: 5, next: 5 })
        ));
        assert!(!path.exists());

        write(4, &[1, 2, 3], &path).unwrap();
        let mut raw = std::fs::read(&path).unwrap();

        // Short body
        raw.truncate(raw.len() - 3);
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(read(&path), Err(KmerError::Truncated)));

        // Trailing bytes
        raw.extend_from_slice(&[0; 11]);
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(read(&path), Err(KmerError::Format(_))));

        // A count that cannot fit in memory
        raw[8..16].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, &raw).unwrap();
        assert!(matches!(read(&path), Err(KmerError::Format(_))));

        std::fs::write(&path, [1, 2, 3]).unwrap();
        assert!(matches!(read(&path), Err(KmerError::Truncated)));
        assert!(matches!(probe_k(&path), Err(KmerError::Truncated)));
    }
}
