//! Embeddings store: label → reference embeddings, plus its binary file codec.
//!
//! File layout (little endian):
//!
//! ```text
//! magic    "LKNS"
//! version  u16 (= 1)
//! labels   u32
//! per label:
//!     len      u32, then `len` bytes of UTF-8
//!     vectors  u32
//!     per vector:
//!         dim  u32, then `dim` × f64
//! ```
//!
//! Values are stored as raw IEEE-754 bits, so a save/load round trip is exact.

use crate::types::Embedding;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

const STORE_MAGIC: &[u8; 4] = b"LKNS";
const STORE_VERSION: u16 = 1;
/// Upper bound on speculative allocation driven by counts read from a file.
const MAX_PREALLOC: usize = 4096;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("gallery file not found: {0}")]
    NotFound(String),
    #[error("malformed gallery file: {0}")]
    Malformed(String),
    #[error("label must not be empty")]
    EmptyLabel,
    #[error("label {0:?} has no embeddings")]
    NoVectors(String),
    #[error("label {label:?}: embedding dimension {actual} does not match gallery dimension {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Mapping from identity label to its ordered reference embeddings.
///
/// Labels iterate in sorted order. Every embedding in the store shares one
/// dimension and every label holds at least one embedding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingsStore {
    labels: BTreeMap<String, Vec<Embedding>>,
}

impl EmbeddingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embeddings for a label, replacing any existing list.
    ///
    /// Returns the previous list. Lists are never merged: calling this twice
    /// for the same label keeps only the second call's vectors.
    pub fn add(
        &mut self,
        label: impl Into<String>,
        embeddings: Vec<Embedding>,
    ) -> Result<Option<Vec<Embedding>>, StoreError> {
        let label = label.into();
        if label.is_empty() {
            return Err(StoreError::EmptyLabel);
        }
        let Some(first) = embeddings.first() else {
            return Err(StoreError::NoVectors(label));
        };

        // The label being replaced does not constrain its own replacement.
        let expected = self
            .labels
            .iter()
            .filter(|(existing, _)| **existing != label)
            .find_map(|(_, vectors)| vectors.first().map(Embedding::dimension))
            .unwrap_or_else(|| first.dimension());

        if let Some(bad) = embeddings.iter().find(|e| e.dimension() != expected) {
            return Err(StoreError::DimensionMismatch {
                label,
                expected,
                actual: bad.dimension(),
            });
        }

        Ok(self.labels.insert(label, embeddings))
    }

    pub fn get(&self, label: &str) -> Option<&[Embedding]> {
        self.labels.get(label).map(Vec::as_slice)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    /// Labels in sorted order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }

    /// `(label, embeddings)` pairs in sorted label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Embedding])> {
        self.labels.iter().map(|(label, vectors)| (label.as_str(), vectors.as_slice()))
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Shared embedding dimension, or `None` for an empty store.
    pub fn dimension(&self) -> Option<usize> {
        self.labels
            .values()
            .find_map(|vectors| vectors.first().map(Embedding::dimension))
    }

    /// Total number of embeddings across all labels.
    pub fn vector_count(&self) -> usize {
        self.labels.values().map(Vec::len).sum()
    }

    /// Write the store to a file, overwriting it.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        tracing::info!(
            path = %path.display(),
            labels = self.len(),
            vectors = self.vector_count(),
            "saved embeddings store"
        );
        Ok(())
    }

    /// Read a store from a file.
    ///
    /// A missing file is [`StoreError::NotFound`]; bytes that do not parse, or
    /// parse into a store that breaks its invariants, are [`StoreError::Malformed`].
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.display().to_string()),
            _ => StoreError::Io(e),
        })?;
        let store = Self::read_from(&mut BufReader::new(file))?;
        tracing::info!(
            path = %path.display(),
            labels = store.len(),
            vectors = store.vector_count(),
            dimension = ?store.dimension(),
            "loaded embeddings store"
        );
        Ok(store)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), StoreError> {
        writer.write_all(STORE_MAGIC)?;
        writer.write_u16::<LittleEndian>(STORE_VERSION)?;
        writer.write_u32::<LittleEndian>(count_u32(self.labels.len(), "label count")?)?;

        for (label, vectors) in &self.labels {
            writer.write_u32::<LittleEndian>(count_u32(label.len(), "label length")?)?;
            writer.write_all(label.as_bytes())?;
            writer.write_u32::<LittleEndian>(count_u32(vectors.len(), "vector count")?)?;
            for embedding in vectors {
                writer.write_u32::<LittleEndian>(count_u32(embedding.dimension(), "dimension")?)?;
                for &value in &embedding.values {
                    writer.write_f64::<LittleEndian>(value)?;
                }
            }
        }

        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, StoreError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|e| truncated(e, "magic"))?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::Malformed(format!("bad magic {magic:?}")));
        }

        let version = reader.read_u16::<LittleEndian>().map_err(|e| truncated(e, "version"))?;
        if version != STORE_VERSION {
            return Err(StoreError::Malformed(format!("unsupported version {version}")));
        }

        let label_count = reader.read_u32::<LittleEndian>().map_err(|e| truncated(e, "label count"))?;
        let mut store = Self::new();

        for _ in 0..label_count {
            let label = read_label(reader)?;
            let vector_count = reader
                .read_u32::<LittleEndian>()
                .map_err(|e| truncated(e, "vector count"))? as usize;

            let mut vectors = Vec::with_capacity(vector_count.min(MAX_PREALLOC));
            for _ in 0..vector_count {
                let dim = reader.read_u32::<LittleEndian>().map_err(|e| truncated(e, "dimension"))? as usize;
                let mut values = Vec::with_capacity(dim.min(MAX_PREALLOC));
                for _ in 0..dim {
                    values.push(reader.read_f64::<LittleEndian>().map_err(|e| truncated(e, "value"))?);
                }
                vectors.push(Embedding::new(values));
            }

            if store.contains(&label) {
                return Err(StoreError::Malformed(format!("duplicate label {label:?}")));
            }
            store
                .add(label, vectors)
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
        }

        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            return Err(StoreError::Malformed("trailing bytes after last label".into()));
        }

        Ok(store)
    }
}

fn read_label<R: Read>(reader: &mut R) -> Result<String, StoreError> {
    let len = reader.read_u32::<LittleEndian>().map_err(|e| truncated(e, "label length"))? as usize;
    let mut bytes = Vec::with_capacity(len.min(MAX_PREALLOC));
    reader.take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(StoreError::Malformed(format!(
            "truncated label: expected {len} bytes, got {}",
            bytes.len()
        )));
    }
    String::from_utf8(bytes).map_err(|e| StoreError::Malformed(format!("label is not UTF-8: {e}")))
}

/// Early EOF means the file is cut short; anything else is a real I/O failure.
fn truncated(err: io::Error, field: &str) -> StoreError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        StoreError::Malformed(format!("truncated while reading {field}"))
    } else {
        StoreError::Io(err)
    }
}

fn count_u32(n: usize, field: &str) -> Result<u32, StoreError> {
    u32::try_from(n).map_err(|_| {
        StoreError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{field} {n} exceeds the file format limit"),
        ))
    })
}
