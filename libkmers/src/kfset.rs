//! K-mer frequency sets: `(k-mer, count)` pairs ordered by k-mer, each
//! stored as a varint k-mer delta followed by a varint count.

use std::{io::Write, path::Path};

use libcodecs::varint8;

use crate::{
    container::{probe, TcfBody, TcfWriter},
    error::{KmerError, Result},
    meta::{merge_meta, meta_u64, Meta, MetaMap},
    meta_map,
    utils::{next_varint, FileBytes},
};

pub use crate::kset::VERSION;
pub const TYPE: &str = "k-mer frequency set";

fn expected_meta() -> MetaMap
{
    meta_map! { "type" => TYPE, "version" => VERSION, "K" => Meta::Any }
}

/// Write `(k-mer, count)` pairs to `path`, returning how many were
/// written. Consecutive pairs may share a k-mer but may not go backwards.
pub fn write<P, I>(k: u64, xs: I, path: P, extra: Option<&MetaMap>) -> Result<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut meta = meta_map! { "type" => TYPE, "version" => VERSION, "K" => k };
    if let Some(extra) = extra {
        merge_meta(&mut meta, extra)?;
    }

    let mut out = TcfWriter::create(path, &meta)?;
    let mut buf = Vec::with_capacity(32);
    let mut prev = 0;
    let mut n = 0;
    for (x, c) in xs {
        if x < prev {
            return Err(KmerError::NotIncreasing { prev, next: x });
        }
        buf.clear();
        varint8::encode_into(x - prev, &mut buf);
        varint8::encode_into(c, &mut buf);
        out.write_all(&buf)?;
        prev = x;
        n += 1;
    }
    out.finish()?;

    log::debug!("Wrote {n} {k}-mer frequencies");
    Ok(n)
}

/// Open `path`, returning its metadata and a lazy reader of the pairs
pub fn read<P: AsRef<Path>>(path: P) -> Result<(MetaMap, KfSetReader)>
{
    let (meta, body) = probe(path, Some(&expected_meta()))?;
    Ok((
        meta,
        KfSetReader {
            bytes: FileBytes::new(body),
            x: 0,
            done: false,
        },
    ))
}

pub fn probe_k<P: AsRef<Path>>(path: P) -> Result<u64>
{
    let (meta, _) = probe(path, Some(&expected_meta()))?;
    meta_u64(&meta, "K")
}

pub struct KfSetReader
{
    bytes: FileBytes<TcfBody>,
    x: u64,
    done: bool,
}

impl KfSetReader
{
    fn next_pair(&mut self) -> Result<Option<(u64, u64)>>
    {
        let d = match next_varint(&mut self.bytes)? {
            Some(d) => d,
            None => return Ok(None),
        };
        let c = next_varint(&mut self.bytes)?.ok_or(KmerError::Truncated)?;
        self.x = self
            .x
            .checked_add(d)
            .ok_or_else(|| KmerError::Format("k-mer delta overflows".into()))?;
        Ok(Some((self.x, c)))
    }
}

impl Iterator for KfSetReader
{
    type Item = Result<(u64, u64)>;

    fn next(&mut self) -> Option<Result<(u64, u64)>>
    {
        if self.done {
            return None;
        }

        let res = self.next_pair();
        if !matches!(res, Ok(Some(_))) {
            self.done = true;
        }
        res.transpose()
    }
}

/// Pair every k-mer with the frequency `f`
pub fn k2kf<I>(xs: I, f: u64) -> impl Iterator<Item = (u64, u64)>
where
    I: IntoIterator<Item = u64>,
{
    xs.into_iter().map(move |x| (x, f))
}

/// Drop the frequencies
pub fn kf2k<I>(xs: I) -> impl Iterator<Item = u64>
where
    I: IntoIterator<Item = (u64, u64)>,
{
    xs.into_iter().map(|(x, _)| x)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::kset;

    fn init()
    {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_end_to_end()
    {
        init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xs.kfset");

        let xs = vec![(10, 3), (20, 1), (30, 5)];
        assert_eq!(write(4, xs.clone(), &path, None).unwrap(), 3);

        let (meta, itr) = read(&path).unwrap();
        assert_eq!(meta_u64(&meta, "K").unwrap(), 4);
        assert_eq!(meta["type"].as_str(), Some(TYPE));
        let ys: Vec<(u64, u64)> = itr.collect::<Result<_>>().unwrap();
        assert_eq!(ys, xs);
        assert_eq!(probe_k(&path).unwrap(), 4);
    }

    #[test]
    fn test_repeated_kmers()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rep.kfset");

        let xs = vec![(0, 0), (7, 2), (7, 9), (1 << 40, u64::MAX)];
        write(21, xs.clone(), &path, None).unwrap();
        let ys: Vec<(u64, u64)> = read(&path).unwrap().1.collect::<Result<_>>().unwrap();
        assert_eq!(ys, xs);

        assert!(matches!(
            write(21, vec![(7, 1), (6, 1)], &path, None),
            Err(KmerError::NotIncreasing { prev: 7, next: 6 })
        ));
    }

    #[test]
    fn test_kset_is_not_kfset()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xs.kset");
        kset::write(4, vec![1, 2], &path, None).unwrap();
        assert!(matches!(read(&path), Err(KmerError::MetaDataIncompatible { .. })));
        assert!(matches!(kset::read(&path), Ok(_)));
    }

    #[test]
    fn test_truncated_pair()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.kfset");
        write(4, vec![(1, 2), (3, 4)], &path, None).unwrap();

        // Drop the last count, leaving a delta with no count
        let mut raw = std::fs::read(&path).unwrap();
        raw.pop();
        std::fs::write(&path, raw).unwrap();

        let (_, mut itr) = read(&path).unwrap();
        assert_eq!(itr.next().unwrap().unwrap(), (1, 2));
        assert!(matches!(itr.next(), Some(Err(KmerError::Truncated))));
        assert!(itr.next().is_none());
    }

    #[test]
    fn test_adaptors()
    {
        let kfs: Vec<(u64, u64)> = k2kf(vec![3, 5, 8], 1).collect();
        assert_eq!(kfs, vec![(3, 1), (5, 1), (8, 1)]);
        assert_eq!(kf2k(kfs).collect::<Vec<_>>(), vec![3, 5, 8]);

        let dir = tempfile::tempdir().unwrap();
        let kpath = dir.path().join("a.kset");
        let kfpath = dir.path().join("a.kfset");
        kset::write(9, vec![100, 200], &kpath, None).unwrap();

        let (meta, xs) = kset::read(&kpath).unwrap();
        let k = meta_u64(&meta, "K").unwrap();
        let xs: Vec<u64> = xs.collect::<Result<_>>().unwrap();
        write(k, k2kf(xs, 2), &kfpath, None).unwrap();

        let ys: Vec<(u64, u64)> = read(&kfpath).unwrap().1.collect::<Result<_>>().unwrap();
        assert_eq!(ys, vec![(100, 2), (200, 2)]);
    }
}
