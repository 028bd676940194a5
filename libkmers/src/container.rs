//! The TCF container: a `TCF` cookie, a metadata map, then either a raw
//! body stream or a sequence of named block vectors.
//!
//! Each block is a header map (`name`, `width` and the caller's tags)
//! followed by a vector in the layout of [`crate::vectors`]. Opening a
//! [`Container`] skips over the chunks to build a manifest, so blocks can be
//! found by name or by tag and read in any order.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::{
    error::{KmerError, Result},
    meta::{check_meta, get_meta, meta_str, meta_u64, put_meta, Meta, MetaMap},
    utils::FileBytes,
    vectors::{
        read_vector, skip_vector, write_vector_chunked, Element, VectorReader,
        CHUNK_ELEMENTS,
    },
};

pub const COOKIE: &[u8; 3] = b"TCF";

/// Reader positioned at the first byte after the container metadata
pub type TcfBody = BufReader<File>;

/// Block vector iterator returned by [`Container::read`]
pub type BlockReader<T> = VectorReader<BufReader<File>, T>;

/// Writes the container preamble, then blocks or a raw body.
pub struct TcfWriter<W: Write>
{
    out: W,
    names: BTreeSet<String>,
    chunk_elements: usize,
    finished: bool,
}

impl TcfWriter<BufWriter<File>>
{
    pub fn create<P: AsRef<Path>>(path: P, meta: &MetaMap) -> Result<Self>
    {
        let out = BufWriter::new(File::create(path.as_ref())?);
        log::debug!("Creating container {}", path.as_ref().display());
        TcfWriter::new(out, meta)
    }
}

impl<W: Write> TcfWriter<W>
{
    pub fn new(mut out: W, meta: &MetaMap) -> Result<Self>
    {
        out.write_all(COOKIE)?;
        put_meta(&mut out, &Meta::Map(meta.clone()))?;
        Ok(TcfWriter {
            out,
            names: BTreeSet::new(),
            chunk_elements: CHUNK_ELEMENTS,
            finished: false,
        })
    }

    /// Configuration. Elements per chunk, at most [`CHUNK_ELEMENTS`].
    pub fn with_chunk_elements(mut self, chunk_elements: usize) -> Self
    {
        self.chunk_elements = chunk_elements.clamp(1, CHUNK_ELEMENTS);
        self
    }

    /// Write one named block, returning its element count
    pub fn write_block<T, I>(
        &mut self,
        name: &str,
        tags: &MetaMap,
        values: I,
    ) -> Result<u64>
    where
        T: Element,
        I: IntoIterator<Item = T>,
    {
        if tags.contains_key("name") || tags.contains_key("width") {
            return Err(KmerError::Contract(format!(
                "tags of block {name} may not set name or width"
            )));
        }
        if !self.names.insert(name.to_string()) {
            return Err(KmerError::Contract(format!("block {name} written twice")));
        }

        let mut header = tags.clone();
        header.insert("name".to_string(), Meta::from(name));
        header.insert("width".to_string(), Meta::from(T::WIDTH * 8));
        put_meta(&mut self.out, &Meta::Map(header))?;

        let n = write_vector_chunked(&mut self.out, values, self.chunk_elements)?;
        log::debug!("Wrote block {name}: {n} x {} bits", T::WIDTH * 8);
        Ok(n)
    }

    pub fn write16<I>(&mut self, name: &str, tags: &MetaMap, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = u16>,
    {
        self.write_block(name, tags, values)
    }

    pub fn write32<I>(&mut self, name: &str, tags: &MetaMap, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = u32>,
    {
        self.write_block(name, tags, values)
    }

    pub fn write64<I>(&mut self, name: &str, tags: &MetaMap, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = u64>,
    {
        self.write_block(name, tags, values)
    }

    pub fn get_ref(&self) -> &W
    {
        &self.out
    }

    pub fn finish(mut self) -> Result<()>
    {
        self.finished = true;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> Write for TcfWriter<W>
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()>
    {
        self.out.flush()
    }
}

impl<W: Write> Drop for TcfWriter<W>
{
    fn drop(&mut self)
    {
        if !self.finished {
            if let Err(e) = self.out.flush() {
                log::error!("Unable to flush container on drop: {e}");
            }
        }
    }
}

/// Read the cookie and metadata from `inp`, leaving it at the body
pub fn read_header<R: BufRead>(inp: &mut R, expected: Option<&MetaMap>) -> Result<MetaMap>
{
    let mut cookie = [0; 3];
    match inp.read_exact(&mut cookie) {
        Ok(()) => (),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(KmerError::BadCookie),
        Err(e) => return Err(e.into()),
    }
    if &cookie != COOKIE {
        return Err(KmerError::BadCookie);
    }

    let meta = match FileBytes::new(&mut *inp).with(|bytes| get_meta(bytes))? {
        Meta::Map(m) => m,
        other => {
            return Err(KmerError::Format(format!(
                "container metadata is not a map: {other}"
            )))
        }
    };

    if let Some(expected) = expected {
        check_meta(expected, &meta)?;
    }
    Ok(meta)
}

/// Open `path`, check the cookie and metadata, and return the metadata with
/// a reader over the rest of the file.
pub fn probe<P: AsRef<Path>>(path: P, expected: Option<&MetaMap>) -> Result<(MetaMap, TcfBody)>
{
    let mut body = BufReader::new(File::open(path.as_ref())?);
    let meta = read_header(&mut body, expected)?;
    Ok((meta, body))
}

/// Manifest entry for one block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo
{
    /// Header entries other than `name` and `width`
    pub tags: MetaMap,
    /// Element width in bits
    pub width: usize,
    /// Number of elements stored
    pub count: u64,
    offset: u64,
}

/// A container opened for reading blocks
pub struct Container
{
    path: PathBuf,
    meta: MetaMap,
    manifest: BTreeMap<String, BlockInfo>,
}

impl Container
{
    pub fn open<P: AsRef<Path>>(path: P, expected: Option<&MetaMap>) -> Result<Self>
    {
        let (meta, mut body) = probe(path.as_ref(), expected)?;

        let mut manifest = BTreeMap::new();
        while !body.fill_buf()?.is_empty() {
            let (name, info) = scan_block(&mut body)?;
            if manifest.insert(name.clone(), info).is_some() {
                return Err(KmerError::Format(format!("duplicate block {name}")));
            }
        }
        log::debug!(
            "Opened container {} with {} blocks",
            path.as_ref().display(),
            manifest.len()
        );

        Ok(Container {
            path: path.as_ref().to_path_buf(),
            meta,
            manifest,
        })
    }

    pub fn meta(&self) -> &MetaMap
    {
        &self.meta
    }

    pub fn manifest(&self) -> &BTreeMap<String, BlockInfo>
    {
        &self.manifest
    }

    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.manifest.keys().map(String::as_str)
    }

    pub fn block(&self, name: &str) -> Option<&BlockInfo>
    {
        self.manifest.get(name)
    }

    /// Names of the blocks whose tags satisfy `pred`, in name order
    pub fn find<F>(&self, pred: F) -> Vec<&str>
    where
        F: Fn(&MetaMap) -> bool,
    {
        self.manifest
            .iter()
            .filter(|(_, info)| pred(&info.tags))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn find_tagged<V: Into<Meta>>(&self, key: &str, value: V) -> Vec<&str>
    {
        let value = value.into();
        self.find(|tags| tags.get(key) == Some(&value))
    }

    /// Lazily read the first `count` elements of block `name`. Asking for
    /// more than the block holds yields [`KmerError::Truncated`] once the
    /// stored elements run out.
    pub fn read<T: Element>(&self, name: &str, count: u64) -> Result<BlockReader<T>>
    {
        let info = self
            .manifest
            .get(name)
            .ok_or_else(|| KmerError::NotFound(format!("block {name}")))?;
        if info.width != T::WIDTH * 8 {
            return Err(KmerError::Format(format!(
                "block {name} holds {} bit values, not {}",
                info.width,
                T::WIDTH * 8
            )));
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(info.offset))?;
        Ok(read_vector(BufReader::new(file), count))
    }

    /// Read a whole block into memory
    pub fn read_all<T: Element>(&self, name: &str) -> Result<Vec<T>>
    {
        let count = self
            .manifest
            .get(name)
            .map(|info| info.count)
            .ok_or_else(|| KmerError::NotFound(format!("block {name}")))?;
        self.read(name, count)?.collect()
    }

    pub fn read16(&self, name: &str, count: u64) -> Result<BlockReader<u16>>
    {
        self.read(name, count)
    }

    pub fn read32(&self, name: &str, count: u64) -> Result<BlockReader<u32>>
    {
        self.read(name, count)
    }

    pub fn read64(&self, name: &str, count: u64) -> Result<BlockReader<u64>>
    {
        self.read(name, count)
    }
}

fn scan_block(body: &mut TcfBody) -> Result<(String, BlockInfo)>
{
    let mut tags = match FileBytes::new(&mut *body).with(|bytes| get_meta(bytes))? {
        Meta::Map(m) => m,
        other => {
            return Err(KmerError::Format(format!(
                "block header is not a map: {other}"
            )))
        }
    };

    let name = meta_str(&tags, "name")?.to_string();
    let width = meta_u64(&tags, "width")? as usize;
    if !matches!(width, 16 | 32 | 64) {
        return Err(KmerError::Format(format!("block {name} has width {width}")));
    }
    tags.remove("name");
    tags.remove("width");

    let offset = body.stream_position()?;
    let count = skip_vector(body, width / 8)?;

    if let Some(n) = tags.get("N") {
        if n.as_u64() != Some(count) {
            return Err(KmerError::Format(format!(
                "block {name} declares N = {n} but holds {count}"
            )));
        }
    }

    Ok((name, BlockInfo { tags, width, count, offset }))
}
