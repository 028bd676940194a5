use serde::{Deserialize, Serialize};

use crate::{
    error::{KmerError, Result},
    vectors::CHUNK_ELEMENTS,
};

/// Parameters for building a k-mer index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParameters
{
    /// k-mer length, 1 to 32
    pub k: usize,

    /// Index reverse complements as well
    #[serde(default = "default_both_strands")]
    pub both_strands: bool,

    /// Elements per chunk of the stored blocks
    #[serde(default = "default_chunk_elements")]
    pub chunk_elements: usize,
}

fn default_both_strands() -> bool
{
    true
}

fn default_chunk_elements() -> usize
{
    CHUNK_ELEMENTS
}

impl IndexParameters
{
    pub fn default() -> Self
    {
        serde_yml::from_str(include_str!("../../profiles/default.yaml"))
            .expect("bundled profiles/default.yaml is valid")
    }

    pub fn small() -> Self
    {
        serde_yml::from_str(include_str!("../../profiles/small.yaml"))
            .expect("bundled profiles/small.yaml is valid")
    }

    /// Parse and validate a YAML configuration
    pub fn from_yaml_str(s: &str) -> Result<Self>
    {
        let params: IndexParameters = serde_yml::from_str(s)
            .map_err(|e| KmerError::Format(format!("index parameters: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_yaml_string(&self) -> Result<String>
    {
        serde_yml::to_string(self)
            .map_err(|e| KmerError::Format(format!("index parameters: {e}")))
    }

    pub fn with_k(mut self, k: usize) -> Self
    {
        self.k = k;
        self
    }

    pub fn with_both_strands(mut self, both_strands: bool) -> Self
    {
        self.both_strands = both_strands;
        self
    }

    pub fn with_chunk_elements(mut self, chunk_elements: usize) -> Self
    {
        self.chunk_elements = chunk_elements;
        self
    }

    pub fn validate(&self) -> Result<()>
    {
        if !(1..=32).contains(&self.k) {
            return Err(KmerError::Contract(format!(
                "k must be in 1..=32, not {}",
                self.k
            )));
        }
        if !(1..=CHUNK_ELEMENTS).contains(&self.chunk_elements) {
            return Err(KmerError::Contract(format!(
                "chunk_elements must be in 1..={CHUNK_ELEMENTS}, not {}",
                self.chunk_elements
            )));
        }
        Ok(())
    }
}

impl Default for IndexParameters
{
    fn default() -> Self
    {
        Self::default()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_bundled_profiles()
    {
        let p = IndexParameters::default();
        assert_eq!(p.k, 25);
        assert!(p.both_strands);
        assert_eq!(p.chunk_elements, CHUNK_ELEMENTS);
        p.validate().unwrap();

        let p = IndexParameters::small();
        assert_eq!(p.k, 11);
        p.validate().unwrap();
    }

    #[test]
    fn test_from_yaml()
    {
        let p = IndexParameters::from_yaml_str("k: 31\n").unwrap();
        assert_eq!(p.k, 31);
        assert!(p.both_strands);
        assert_eq!(p.chunk_elements, CHUNK_ELEMENTS);

        let yaml = "k: 5\nboth_strands: false\nchunk_elements: 10\n";
        let p = IndexParameters::from_yaml_str(yaml).unwrap();
        let expected = IndexParameters::default()
            .with_k(5)
            .with_both_strands(false)
            .with_chunk_elements(10);
        assert_eq!(p, expected);

        let back = IndexParameters::from_yaml_str(&p.to_yaml_string().unwrap()).unwrap();
        assert_eq!(back, p);

        assert!(matches!(
            IndexParameters::from_yaml_str("k: 33\n"),
            Err(KmerError::Contract(_))
        ));
        assert!(matches!(
            IndexParameters::from_yaml_str("k: 4\nchunk_elements: 0\n"),
            Err(KmerError::Contract(_))
        ));
        assert!(matches!(
            IndexParameters::from_yaml_str("both_strands: true\n"),
            Err(KmerError::Format(_))
        ));
    }
}
