//! K-mer sets: strictly increasing k-mers stored as 8 bit varint deltas
//! in the body of a TCF container.

use std::{io::Write, path::Path};

use libcodecs::varint8;

use crate::{
    container::{probe, TcfBody, TcfWriter},
    error::{KmerError, Result},
    meta::{merge_meta, meta_u64, Meta, MetaMap},
    meta_map,
    utils::{next_varint, FileBytes},
};

pub const VERSION: u64 = 20160930;
pub const TYPE: &str = "k-mer set";

fn expected_meta() -> MetaMap
{
    meta_map! { "type" => TYPE, "version" => VERSION, "K" => Meta::Any }
}

/// Write the sorted k-mers `xs` to `path`, returning how many were
/// written. `extra` entries are added to the metadata and may not
/// contradict `type`, `version` or `K`.
///
/// A value not above its predecessor is [`KmerError::NotIncreasing`] and
/// leaves a partial file behind.
pub fn write<P, I>(k: u64, xs: I, path: P, extra: Option<&MetaMap>) -> Result<u64>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = u64>,
{
    let mut meta = meta_map! { "type" => TYPE, "version" => VERSION, "K" => k };
    if let Some(extra) = extra {
        merge_meta(&mut meta, extra)?;
    }

    let mut out = TcfWriter::create(path, &meta)?;
    let mut buf = Vec::with_capacity(16);
    let mut prev = None;
    let mut n = 0;
    for x in xs {
        let d = match prev {
            Some(p) if x <= p => return Err(KmerError::NotIncreasing { prev: p, next: x }),
            Some(p) => x - p,
            None => x,
        };
        buf.clear();
        varint8::encode_into(d, &mut buf);
        out.write_all(&buf)?;
        prev = Some(x);
        n += 1;
    }
    out.finish()?;

    log::debug!("Wrote {n} {k}-mers");
    Ok(n)
}

/// Open `path`, returning its metadata and a lazy reader of the k-mers
pub fn read<P: AsRef<Path>>(path: P) -> Result<(MetaMap, KSetReader)>
{
    let (meta, body) = probe(path, Some(&expected_meta()))?;
    Ok((
        meta,
        KSetReader {
            bytes: FileBytes::new(body),
            x: 0,
            done: false,
        },
    ))
}

/// `K` of the set in `path`, without touching the body
pub fn probe_k<P: AsRef<Path>>(path: P) -> Result<u64>
{
    let (meta, _) = probe(path, Some(&expected_meta()))?;
    meta_u64(&meta, "K")
}

pub struct KSetReader
{
    bytes: FileBytes<TcfBody>,
    x: u64,
    done: bool,
}

impl Iterator for KSetReader
{
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Result<u64>>
    {
        if self.done {
            return None;
        }

        let res = next_varint(&mut self.bytes).and_then(|d| match d {
            Some(d) => self
                .x
                .checked_add(d)
                .map(Some)
                .ok_or_else(|| KmerError::Format("k-mer delta overflows".into())),
            None => Ok(None),
        });

        match res {
            Ok(Some(x)) => {
                self.x = x;
                Some(Ok(x))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;

    fn init()
    {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_round_trip()
    {
        init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xs.kset");

        let mut rng = ChaCha20Rng::seed_from_u64(19);
        let mut xs: Vec<u64> = (0..10_000).map(|_| rng.gen_range(0..1 << 50)).collect();
        xs.sort_unstable();
        xs.dedup();
        xs[0] = 0;

        assert_eq!(write(25, xs.iter().copied(), &path, None).unwrap(), xs.len() as u64);
        assert_eq!(probe_k(&path).unwrap(), 25);

        let (meta, itr) = read(&path).unwrap();
        assert_eq!(meta["type"], Meta::from(TYPE));
        assert_eq!(meta["version"], Meta::UInt(VERSION));
        let ys: Vec<u64> = itr.collect::<Result<_>>().unwrap();
        assert_eq!(xs, ys);

        // Early abandonment is fine
        let (_, itr) = read(&path).unwrap();
        assert_eq!(itr.take(3).collect::<Result<Vec<_>>>().unwrap(), &xs[..3]);
    }

    #[test]
    fn test_not_increasing()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.kset");
        match write(4, vec![5, 5], &path, None) {
            Err(KmerError::NotIncreasing { prev, next }) => {
                assert_eq!((prev, next), (5, 5));
            }
            other => panic!("expected NotIncreasing, got {other:?}"),
        }
        assert!(matches!(
            write(4, vec![1, 9, 3], &path, None),
            Err(KmerError::NotIncreasing { prev: 9, next: 3 })
        ));
    }

    #[test]
    fn test_extra_meta()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.kset");

        let extra = meta_map! { "source" => "reads.fa", "K" => 21_u64 };
        write(21, vec![1, 2, 3], &path, Some(&extra)).unwrap();
        let (meta, _) = read(&path).unwrap();
        assert_eq!(meta["source"].as_str(), Some("reads.fa"));

        let clash = meta_map! { "K" => 25_u64 };
        assert!(matches!(
            write(21, vec![1], &path, Some(&clash)),
            Err(KmerError::MetaDataIncompatible { .. })
        ));
    }

    #[test]
    fn test_wrong_type_and_truncation()
    {
        let dir = tempfile::tempdir().unwrap();

        let other = dir.path().join("other.tcf");
        let meta = meta_map! {
            "type" => "k-mer frequency set",
            "version" => VERSION,
            "K" => 4_u64,
        };
        TcfWriter::create(&other, &meta)
            .unwrap()
            .finish()
            .unwrap();
        assert!(matches!(read(&other), Err(KmerError::MetaDataIncompatible { .. })));

        let cut = dir.path().join("cut.kset");
        write(4, vec![1, 1000], &cut, None).unwrap();
        let mut raw = std::fs::read(&cut).unwrap();
        raw.pop();
        std::fs::write(&cut, raw).unwrap();

        let (_, mut itr) = read(&cut).unwrap();
        assert_eq!(itr.next().unwrap().unwrap(), 1);
        assert!(matches!(itr.next(), Some(Err(KmerError::Truncated))));
        assert!(itr.next().is_none());
    }
}
