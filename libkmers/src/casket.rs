//! Casket: an append only archive of named byte regions.
//!
//! Layout is `[regions][JSON TOC][u64 LE TOC length]`. The TOC maps each
//! name to the `[offset, length]` of every version written under it; the
//! last version is the current one. Content can be streamed in without
//! knowing its length up front and read back in place without copying.
//!
//! Only one stream can be open on a writer at a time, because the stream
//! holds the writer's mutable borrow:
//!
//! ```compile_fail
//! use std::io::Write;
//! use libkmers::casket::CasketWriter;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut w = CasketWriter::create(dir.path().join("x.casket")).unwrap();
//! let mut a = w.add_stream("a");
//! let mut b = w.add_stream("b");
//! a.write_all(b"one").unwrap();
//! b.write_all(b"two").unwrap();
//! ```

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::error::{KmerError, Result};

const COPY_BLOCK_BYTES: usize = 1024 * 1024;

type Toc = BTreeMap<String, Vec<(u64, u64)>>;

/// One version of a named region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region
{
    pub offset: u64,
    pub length: u64,
}

impl From<(u64, u64)> for Region
{
    fn from((offset, length): (u64, u64)) -> Self
    {
        Region { offset, length }
    }
}

pub struct CasketWriter
{
    out: BufWriter<File>,
    pos: u64,
    toc: Toc,
    closed: bool,
}

impl CasketWriter
{
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let out = BufWriter::new(File::create(path.as_ref())?);
        log::debug!("Creating casket {}", path.as_ref().display());
        Ok(CasketWriter {
            out,
            pos: 0,
            toc: Toc::new(),
            closed: false,
        })
    }

    fn update_toc(&mut self, name: &str, offset: u64, length: u64)
    {
        self.toc
            .entry(name.to_string())
            .or_default()
            .push((offset, length));
    }

    /// Copy the file at `path` in as `name`
    pub fn add_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> Result<Region>
    {
        let mut inp = BufReader::with_capacity(COPY_BLOCK_BYTES, File::open(path)?);
        let offset = self.pos;
        let length = io::copy(&mut inp, &mut self.out)?;
        self.pos += length;
        self.update_toc(name, offset, length);
        Ok(Region { offset, length })
    }

    pub fn add_content(&mut self, name: &str, content: &[u8]) -> Result<Region>
    {
        let offset = self.pos;
        self.out.write_all(content)?;
        let length = content.len() as u64;
        self.pos += length;
        self.update_toc(name, offset, length);
        Ok(Region { offset, length })
    }

    /// Open a stream for `name`. Its entry is recorded when the stream is
    /// closed or dropped.
    pub fn add_stream(&mut self, name: &str) -> CasketStream<'_>
    {
        let offset = self.pos;
        CasketStream {
            casket: self,
            name: name.to_string(),
            offset,
            length: 0,
            closed: false,
        }
    }

    /// Latest version of every name, in name order
    pub fn list(&self) -> Vec<(String, Region)>
    {
        latest(&self.toc)
    }

    fn write_toc(&mut self) -> Result<()>
    {
        self.closed = true;
        let toc = serde_json::to_vec(&self.toc)
            .map_err(|e| KmerError::Format(format!("casket TOC: {e}")))?;
        self.out.write_all(&toc)?;
        self.out.write_all(&(toc.len() as u64).to_le_bytes())?;
        self.out.flush()?;
        log::debug!("Wrote casket TOC: {} names, {} bytes", self.toc.len(), toc.len());
        Ok(())
    }

    pub fn close(mut self) -> Result<()>
    {
        self.write_toc()
    }
}

impl Drop for CasketWriter
{
    fn drop(&mut self)
    {
        if !self.closed {
            if let Err(e) = self.write_toc() {
                log::error!("Unable to write casket TOC on drop: {e}");
            }
        }
    }
}

/// Streaming writer for one casket entry
pub struct CasketStream<'a>
{
    casket: &'a mut CasketWriter,
    name: String,
    offset: u64,
    length: u64,
    closed: bool,
}

impl CasketStream<'_>
{
    /// Bytes written so far
    pub fn len(&self) -> u64
    {
        self.length
    }

    pub fn is_empty(&self) -> bool
    {
        self.length == 0
    }

    pub fn close(mut self) -> Region
    {
        self.finish()
    }

    fn finish(&mut self) -> Region
    {
        self.closed = true;
        self.casket.update_toc(&self.name, self.offset, self.length);
        Region {
            offset: self.offset,
            length: self.length,
        }
    }
}

impl Write for CasketStream<'_>
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        let n = self.casket.out.write(buf)?;
        self.length += n as u64;
        self.casket.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()>
    {
        self.casket.out.flush()
    }
}

impl Drop for CasketStream<'_>
{
    fn drop(&mut self)
    {
        if !self.closed {
            self.finish();
        }
    }
}

pub struct CasketReader
{
    file: File,
    toc: Toc,
}

impl CasketReader
{
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let mut file = File::open(path.as_ref())?;
        let size = file.metadata()?.len();
        if size < 8 {
            return Err(KmerError::Format("casket too short for a trailer".into()));
        }

        let mut trailer = [0; 8];
        file.seek(SeekFrom::End(-8))?;
        file.read_exact(&mut trailer)?;
        let toc_len = u64::from_le_bytes(trailer);
        if toc_len > size - 8 {
            return Err(KmerError::Format(format!(
                "casket TOC length {toc_len} exceeds file size {size}"
            )));
        }

        let data_end = size - 8 - toc_len;
        let mut raw = vec![0; toc_len as usize];
        file.seek(SeekFrom::Start(data_end))?;
        file.read_exact(&mut raw)?;
        let toc: Toc = serde_json::from_slice(&raw)
            .map_err(|e| KmerError::Format(format!("casket TOC: {e}")))?;

        for (name, versions) in &toc {
            for &(offset, length) in versions {
                if offset.checked_add(length).map_or(true, |end| end > data_end) {
                    return Err(KmerError::Format(format!(
                        "casket entry {name} at {offset}+{length} lies outside the data"
                    )));
                }
            }
        }
        log::debug!(
            "Opened casket {} with {} names",
            path.as_ref().display(),
            toc.len()
        );

        Ok(CasketReader { file, toc })
    }

    pub fn list(&self) -> Vec<(String, Region)>
    {
        latest(&self.toc)
    }

    /// Every version of `name`, oldest first
    pub fn versions(&self, name: &str) -> Vec<Region>
    {
        self.toc
            .get(name)
            .map(|vs| vs.iter().copied().map(Region::from).collect())
            .unwrap_or_default()
    }

    /// Open the latest version of `name` for reading
    pub fn open_entry(&self, name: &str) -> Result<CasketEntry<'_>>
    {
        let region = self
            .toc
            .get(name)
            .and_then(|vs| vs.last())
            .copied()
            .map(Region::from)
            .ok_or_else(|| KmerError::NotFound(format!("casket entry {name}")))?;
        Ok(CasketEntry {
            file: &self.file,
            region,
            pos: 0,
        })
    }
}

fn latest(toc: &Toc) -> Vec<(String, Region)>
{
    toc.iter()
        .filter_map(|(name, vs)| vs.last().map(|&v| (name.clone(), Region::from(v))))
        .collect()
}

/// Read only view of one region of a casket
pub struct CasketEntry<'a>
{
    file: &'a File,
    region: Region,
    pos: u64,
}

impl CasketEntry<'_>
{
    pub fn region(&self) -> Region
    {
        self.region
    }

    /// Bytes left to read
    pub fn remaining(&self) -> u64
    {
        self.region.length - self.pos
    }

    /// Read up to `n` bytes, fewer only at the end of the region
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>>
    {
        let n = (n as u64).min(self.remaining()) as usize;
        let mut buf = vec![0; n];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_to_end_vec(&mut self) -> Result<Vec<u8>>
    {
        self.read_bytes(self.remaining() as usize)
    }
}

impl Read for CasketEntry<'_>
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>
    {
        let n = (buf.len() as u64).min(self.remaining()) as usize;
        if n == 0 {
            return Ok(0);
        }
        let mut file = self.file;
        file.seek(SeekFrom::Start(self.region.offset + self.pos))?;
        let n = file.read(&mut buf[..n])?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn init()
    {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_versions()
    {
        init();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.casket");
        {
            let mut w = CasketWriter::create(&path).unwrap();
            w.add_content("a", b"hello").unwrap();
            w.add_content("b", b"xyz").unwrap();
            w.add_content("a", b"world!").unwrap();
            w.close().unwrap();
        }

        let r = CasketReader::open(&path).unwrap();
        assert_eq!(
            r.list(),
            vec![
                ("a".to_string(), Region { offset: 8, length: 6 }),
                ("b".to_string(), Region { offset: 5, length: 3 }),
            ]
        );
        assert_eq!(
            r.versions("a"),
            vec![Region { offset: 0, length: 5 }, Region { offset: 8, length: 6 }]
        );
        assert!(r.versions("c").is_empty());

        assert_eq!(r.open_entry("a").unwrap().read_to_end_vec().unwrap(), b"world!");
        assert_eq!(r.open_entry("b").unwrap().read_to_end_vec().unwrap(), b"xyz");
        assert!(matches!(r.open_entry("c"), Err(KmerError::NotFound(_))));

        // The trailer carries the JSON TOC length
        let raw = std::fs::read(&path).unwrap();
        let toc_len = u64::from_le_bytes(raw[raw.len() - 8..].try_into().unwrap()) as usize;
        let toc = &raw[raw.len() - 8 - toc_len..raw.len() - 8];
        assert_eq!(toc, br#"{"a":[[0,5],[8,6]],"b":[[5,3]]}"#);
    }

    #[test]
    fn test_streams_and_files()
    {
        init();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, b"from a file").unwrap();

        let path = dir.path().join("b.casket");
        {
            let mut w = CasketWriter::create(&path).unwrap();
            {
                let mut s = w.add_stream("s");
                s.write_all(b"stream ").unwrap();
                s.write_all(b"content").unwrap();
                assert_eq!(s.len(), 14);
                assert_eq!(s.close(), Region { offset: 0, length: 14 });
            }
            {
                // Dropped rather than closed
                let mut s = w.add_stream("t");
                s.write_all(b"dropped").unwrap();
            }
            w.add_file("f", &src).unwrap();
            assert_eq!(w.list().len(), 3);
            // Not closed, the TOC is written on drop
        }

        let r = CasketReader::open(&path).unwrap();
        assert_eq!(r.open_entry("s").unwrap().read_to_end_vec().unwrap(), b"stream content");
        assert_eq!(r.open_entry("t").unwrap().read_to_end_vec().unwrap(), b"dropped");

        let mut f = r.open_entry("f").unwrap();
        let mut s = r.open_entry("s").unwrap();
        assert_eq!(f.read_bytes(4).unwrap(), b"from");
        assert_eq!(s.read_bytes(6).unwrap(), b"stream");
        assert_eq!(f.read_bytes(100).unwrap(), b" a file");
        assert_eq!(f.remaining(), 0);
        assert!(f.read_bytes(1).unwrap().is_empty());

        let mut rest = String::new();
        s.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, " content");
    }

    #[test]
    fn test_bad_trailer()
    {
        let dir = tempfile::tempdir().unwrap();

        let short = dir.path().join("short.casket");
        std::fs::write(&short, b"abc").unwrap();
        assert!(matches!(CasketReader::open(&short), Err(KmerError::Format(_))));

        let long = dir.path().join("long.casket");
        std::fs::write(&long, 1000_u64.to_le_bytes()).unwrap();
        assert!(matches!(CasketReader::open(&long), Err(KmerError::Format(_))));

        // A region that runs past the data area
        let oob = dir.path().join("oob.casket");
        let toc = br#"{"a":[[0,10]]}"#;
        let mut raw = b"abc".to_vec();
        raw.extend_from_slice(toc);
        raw.extend_from_slice(&(toc.len() as u64).to_le_bytes());
        std::fs::write(&oob, raw).unwrap();
        assert!(matches!(CasketReader::open(&oob), Err(KmerError::Format(_))));
    }
}
