//! Inverted index from k-mer to the ordinals of the sequences holding it.
//!
//! The distinct k-mers form a [`SparseSet`]; the postings of the k-mer of
//! rank `r` are `postings[offsets[r]..offsets[r + 1]]`, in sequence order.
//! Postings are 16 bit, so an index covers at most 65536 sequences.

use std::path::Path;

use itertools::Itertools;
use needletail::parse_fastx_file;

use crate::{
    container::{Container, TcfWriter},
    error::{KmerError, Result},
    kmer_vectors::{read_kmers, write_kmers},
    kmers::kmers,
    meta::{meta_u64, Meta, MetaMap},
    meta_map,
    parameters::IndexParameters,
    sparse::SparseSet,
};

pub const MAX_SEQUENCES: usize = 1 << 16;

/// Build an index of the `k`-mers of both strands of `seqs`, returning the
/// number of distinct k-mers.
pub fn build_index<I, N, S, P>(k: usize, seqs: I, output: P) -> Result<usize>
where
    I: IntoIterator<Item = (N, S)>,
    N: Into<String>,
    S: AsRef<[u8]>,
    P: AsRef<Path>,
{
    let params = IndexParameters::default().with_k(k);
    build_index_with(&params, seqs, output)
}

pub fn build_index_with<I, N, S, P>(
    params: &IndexParameters,
    seqs: I,
    output: P,
) -> Result<usize>
where
    I: IntoIterator<Item = (N, S)>,
    N: Into<String>,
    S: AsRef<[u8]>,
    P: AsRef<Path>,
{
    params.validate()?;
    let k = params.k;

    let mut names = Vec::new();
    let mut per_seq = Vec::new();
    for (name, seq) in seqs {
        if names.len() == MAX_SEQUENCES {
            return Err(KmerError::TooManySequences(names.len() + 1));
        }
        let mut xs: Vec<u64> = kmers(k, seq.as_ref(), params.both_strands).collect();
        xs.sort_unstable();
        xs.dedup();
        names.push(name.into());
        per_seq.push(xs);
    }
    log::info!("Extracted {k}-mers from {} sequences", names.len());

    let lens: Vec<u32> = per_seq
        .iter()
        .map(|xs| u32::try_from(xs.len()))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| KmerError::Contract("too many k-mers in one sequence".into()))?;

    let domain: Vec<u64> = per_seq
        .iter()
        .map(|xs| xs.iter().copied())
        .kmerge()
        .dedup()
        .collect();
    let domain = SparseSet::new(2 * k as u32, domain)?;
    log::info!("{} distinct {k}-mers", domain.count());

    // First pass: posting counts per rank, then exclusive prefix sums
    let mut offsets = vec![0_u32; domain.count() + 1];
    for xs in &per_seq {
        for &x in xs {
            offsets[domain.rank(x)] += 1;
        }
    }
    let mut total: u32 = 0;
    for t in offsets.iter_mut() {
        let n = *t;
        *t = total;
        total = total
            .checked_add(n)
            .ok_or_else(|| KmerError::Contract("more than 2^32 postings".into()))?;
    }

    // Second pass: place sequence ordinals
    let mut cursors = offsets.clone();
    let mut postings = vec![0_u16; total as usize];
    for (i, xs) in per_seq.iter().enumerate() {
        for &x in xs {
            let r = domain.rank(x);
            postings[cursors[r] as usize] = i as u16;
            cursors[r] += 1;
        }
    }

    let meta = meta_map! {
        "K" => k,
        "T" => offsets.len(),
        "U" => postings.len(),
        "lens" => lens.len(),
        "names" => names.clone(),
    };
    let mut out =
        TcfWriter::create(output, &meta)?.with_chunk_elements(params.chunk_elements);
    write_kmers(&mut out, k as u64, domain.as_slice())?;
    out.write32("offsets", &meta_map! { "kind" => "offsets" }, offsets.iter().copied())?;
    out.write16("postings", &meta_map! { "kind" => "postings" }, postings.iter().copied())?;
    out.write32("lens", &meta_map! { "kind" => "lens" }, lens.iter().copied())?;
    out.finish()?;

    log::info!(
        "Built index of {} {k}-mers with {} postings",
        domain.count(),
        postings.len()
    );
    Ok(domain.count())
}

/// Index every record of the FASTA/FASTQ `inputs`, named by their header
/// lines, in file order.
pub fn build_index_from_fasta<P, Q>(k: usize, inputs: &[P], output: Q) -> Result<usize>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let params = IndexParameters::default().with_k(k);
    build_index_from_fasta_with(&params, inputs, output)
}

pub fn build_index_from_fasta_with<P, Q>(
    params: &IndexParameters,
    inputs: &[P],
    output: Q,
) -> Result<usize>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut seqs = Vec::new();
    for input in inputs {
        let mut reader = parse_fastx_file(input.as_ref())?;
        while let Some(record) = reader.next() {
            let record = record?;
            let name = String::from_utf8_lossy(record.id()).into_owned();
            seqs.push((name, record.seq().into_owned()));
        }
        log::debug!("Read {} records so far from {}", seqs.len(), input.as_ref().display());
    }
    build_index_with(params, seqs, output)
}

/// A loaded, read only k-mer index
pub struct KmerIndex
{
    k: usize,
    kmers: SparseSet,
    offsets: Vec<u32>,
    postings: Vec<u16>,
    lens: Vec<u32>,
    names: Vec<String>,
}

impl KmerIndex
{
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self>
    {
        let required = meta_map! {
            "K" => Meta::Any,
            "T" => Meta::Any,
            "U" => Meta::Any,
            "names" => Meta::Any,
        };
        let c = Container::open(path, Some(&required))?;
        let meta = c.meta();

        let k = meta_u64(meta, "K")? as usize;
        if !(1..=32).contains(&k) {
            return Err(KmerError::Format(format!("index K = {k}")));
        }

        let (_, xs) = read_kmers(&c, None)?;
        let kmers = SparseSet::new(2 * k as u32, xs.collect::<Result<_>>()?)?;
        let offsets: Vec<u32> = c
            .read32("offsets", meta_u64(meta, "T")?)?
            .collect::<Result<_>>()?;
        let postings: Vec<u16> = c
            .read16("postings", meta_u64(meta, "U")?)?
            .collect::<Result<_>>()?;
        let lens: Vec<u32> = match (meta.get("lens"), c.block("lens")) {
            (Some(n), Some(_)) => {
                let n = n
                    .as_u64()
                    .ok_or_else(|| KmerError::Format(format!("index lens = {n}")))?;
                c.read32("lens", n)?.collect::<Result<_>>()?
            }
            _ => Vec::new(),
        };
        let names = names_of(meta)?;

        if offsets.len() != kmers.count() + 1
            || offsets.last().map(|&t| t as usize) != Some(postings.len())
        {
            return Err(KmerError::Format(format!(
                "index offsets ({}) do not match k-mers ({}) and postings ({})",
                offsets.len(),
                kmers.count(),
                postings.len()
            )));
        }
        if offsets.iter().tuple_windows().any(|(a, b)| a > b) {
            return Err(KmerError::Format("index offsets decrease".into()));
        }
        if let Some(&p) = postings.iter().find(|&&p| p as usize >= names.len()) {
            return Err(KmerError::Format(format!(
                "posting {p} but only {} sequences",
                names.len()
            )));
        }

        log::debug!("Loaded index of {} {k}-mers", kmers.count());
        Ok(KmerIndex {
            k,
            kmers,
            offsets,
            postings,
            lens,
            names,
        })
    }

    pub fn k(&self) -> usize
    {
        self.k
    }

    /// Ordinals of the sequences containing `x`, empty if none do
    pub fn get(&self, x: u64) -> &[u16]
    {
        match self.kmers.access(x) {
            Some(r) => {
                &self.postings[self.offsets[r] as usize..self.offsets[r + 1] as usize]
            }
            None => &[],
        }
    }

    pub fn kmers(&self) -> &SparseSet
    {
        &self.kmers
    }

    pub fn names(&self) -> &[String]
    {
        &self.names
    }

    pub fn name(&self, i: usize) -> Option<&str>
    {
        self.names.get(i).map(String::as_str)
    }

    /// Distinct k-mers per sequence
    pub fn lens(&self) -> &[u32]
    {
        &self.lens
    }
}

/// Load the index stored at `path`
pub fn index<P: AsRef<Path>>(path: P) -> Result<KmerIndex>
{
    KmerIndex::load(path)
}

fn names_of(meta: &MetaMap) -> Result<Vec<String>>
{
    let bad = || KmerError::Format("index names are not a tuple of strings".into());
    meta.get("names")
        .and_then(Meta::as_tuple)
        .ok_or_else(bad)?
        .iter()
        .map(|m| m.as_str().map(str::to_string).ok_or_else(bad))
        .collect()
}
