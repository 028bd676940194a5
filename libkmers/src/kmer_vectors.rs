//! Named k-mer and count blocks inside a TCF container.
//!
//! K-mers go in a 64 bit block `"{K}-mers"` tagged `kind: "k-mers"`, and
//! counts in a 32 bit block `"{K}-counts"` tagged `kind: "k-mer counts"`.
//! Both carry `K` and `N` tags. Readers find blocks by `kind` unless told
//! which one to use.

use std::io::Write;

use crate::{
    container::{BlockReader, Container, TcfWriter},
    error::{KmerError, Result},
    meta::{meta_u64, MetaMap},
    meta_map,
};

pub const KMERS_KIND: &str = "k-mers";
pub const COUNTS_KIND: &str = "k-mer counts";

pub fn kmers_name(k: u64) -> String
{
    format!("{k}-mers")
}

pub fn counts_name(k: u64) -> String
{
    format!("{k}-counts")
}

pub fn write_kmers<W: Write>(w: &mut TcfWriter<W>, k: u64, xs: &[u64]) -> Result<u64>
{
    let tags = meta_map! { "kind" => KMERS_KIND, "K" => k, "N" => xs.len() };
    w.write64(&kmers_name(k), &tags, xs.iter().copied())
}

pub fn write_counts<W: Write>(w: &mut TcfWriter<W>, k: u64, cs: &[u32]) -> Result<u64>
{
    let tags = meta_map! { "kind" => COUNTS_KIND, "K" => k, "N" => cs.len() };
    w.write32(&counts_name(k), &tags, cs.iter().copied())
}

pub fn write_kmers_and_counts<W: Write>(
    w: &mut TcfWriter<W>,
    k: u64,
    pairs: &[(u64, u32)],
) -> Result<u64>
{
    let (xs, cs): (Vec<u64>, Vec<u32>) = pairs.iter().copied().unzip();
    write_kmers(w, k, &xs)?;
    write_counts(w, k, &cs)
}

fn locate<'a>(c: &'a Container, kind: &str, which: Option<&'a str>) -> Result<&'a str>
{
    if let Some(name) = which {
        return match c.block(name) {
            Some(_) => Ok(name),
            None => Err(KmerError::NotFound(format!("block {name}"))),
        };
    }

    let names = c.find_tagged("kind", kind);
    match names.as_slice() {
        [] => Err(KmerError::NotFound(format!("no block of kind {kind}"))),
        [name] => Ok(*name),
        _ => Err(KmerError::Ambiguous(format!("kind {kind}"))),
    }
}

fn open_block<'a>(
    c: &'a Container,
    kind: &str,
    which: Option<&'a str>,
) -> Result<(&'a str, &'a MetaMap, u64)>
{
    let name = locate(c, kind, which)?;
    let info = c
        .block(name)
        .ok_or_else(|| KmerError::NotFound(format!("block {name}")))?;
    Ok((name, &info.tags, info.count))
}

/// Tags and a lazy reader of a k-mer block
pub fn read_kmers<'a>(
    c: &'a Container,
    which: Option<&'a str>,
) -> Result<(&'a MetaMap, BlockReader<u64>)>
{
    let (name, tags, n) = open_block(c, KMERS_KIND, which)?;
    Ok((tags, c.read64(name, n)?))
}

pub fn read_counts<'a>(
    c: &'a Container,
    which: Option<&'a str>,
) -> Result<(&'a MetaMap, BlockReader<u32>)>
{
    let (name, tags, n) = open_block(c, COUNTS_KIND, which)?;
    Ok((tags, c.read32(name, n)?))
}

/// Zip the k-mer and count blocks. `which` is the `K` prefix shared by the
/// block names, e.g. `"25"` for `"25-mers"` and `"25-counts"`.
pub fn read_kmers_and_counts(
    c: &Container,
    which: Option<&str>,
) -> Result<impl Iterator<Item = Result<(u64, u32)>>>
{
    let (kname, cname) = match which {
        Some(w) => (Some(format!("{w}-mers")), Some(format!("{w}-counts"))),
        None => (None, None),
    };
    let (m0, xs) = read_kmers(c, kname.as_deref())?;
    let (m1, cs) = read_counts(c, cname.as_deref())?;

    let (k0, k1) = (meta_u64(m0, "K")?, meta_u64(m1, "K")?);
    if k0 != k1 {
        return Err(KmerError::MismatchedK(k0, k1));
    }
    let (n0, n1) = (meta_u64(m0, "N")?, meta_u64(m1, "N")?);
    if n0 != n1 {
        return Err(KmerError::Format(format!(
            "{n0} k-mers but {n1} counts"
        )));
    }

    Ok(xs
        .zip(cs)
        .map(|(x, c)| -> Result<(u64, u32)> { Ok((x?, c?)) }))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_kmers_and_counts()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kc.tcf");
        let pairs = vec![(3, 1), (9, 4), (27, 2), (81, 7)];
        {
            let mut w = TcfWriter::create(&path, &meta_map! { "K" => 5_u64 }).unwrap();
            assert_eq!(write_kmers_and_counts(&mut w, 5, &pairs).unwrap(), 4);
            w.finish().unwrap();
        }

        let c = Container::open(&path, None).unwrap();
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["5-counts", "5-mers"]);

        let (tags, xs) = read_kmers(&c, None).unwrap();
        assert_eq!(meta_u64(tags, "N").unwrap(), 4);
        let xs: Vec<u64> = xs.collect::<Result<_>>().unwrap();
        assert_eq!(xs, vec![3, 9, 27, 81]);

        let (_, cs) = read_counts(&c, Some("5-counts")).unwrap();
        assert_eq!(cs.collect::<Result<Vec<_>>>().unwrap(), vec![1, 4, 2, 7]);

        let both: Vec<(u64, u32)> = read_kmers_and_counts(&c, None)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(both, pairs);
        let both: Vec<(u64, u32)> = read_kmers_and_counts(&c, Some("5"))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(both, pairs);

        assert!(matches!(read_kmers(&c, Some("6-mers")), Err(KmerError::NotFound(_))));
    }

    #[test]
    fn test_missing_and_ambiguous()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("many.tcf");
        {
            let mut w = TcfWriter::create(&path, &MetaMap::new()).unwrap();
            write_kmers(&mut w, 5, &[1, 2]).unwrap();
            write_kmers(&mut w, 7, &[3]).unwrap();
            write_counts(&mut w, 7, &[1, 1]).unwrap();
        }

        let c = Container::open(&path, None).unwrap();
        assert!(matches!(read_kmers(&c, None), Err(KmerError::Ambiguous(_))));
        assert_eq!(read_kmers(&c, Some("7-mers")).unwrap().1.count(), 1);
        assert!(matches!(read_kmers_and_counts(&c, Some("7")), Err(KmerError::Format(_))));
        assert!(matches!(read_kmers_and_counts(&c, Some("5")), Err(KmerError::NotFound(_))));

        let empty = dir.path().join("empty.tcf");
        TcfWriter::create(&empty, &MetaMap::new()).unwrap().finish().unwrap();
        let c = Container::open(&empty, None).unwrap();
        assert!(matches!(read_counts(&c, None), Err(KmerError::NotFound(_))));
    }
}
