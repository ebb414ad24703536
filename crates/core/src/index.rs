//! Flat inner-product vector index.
//!
//! Rows are stored contiguously in insertion order. Since every row is unit length, the
//! inner product between rows equals their cosine similarity. The on-disk layout is the
//! FAISS `IndexFlatIP` serialization, so the file loads with `faiss.read_index`.

use crate::error::IngestError;
use std::io::{self, Read, Write};

const FOURCC_FLAT_IP: [u8; 4] = *b"IxFI";
const METRIC_INNER_PRODUCT: i32 = 0;
const MAX_PREALLOCATED_VALUES: usize = 1 << 20;
const RESERVED_HEADER_VALUE: i64 = 1 << 20;

/// Accumulates vectors for one run. The first vector fixes the dimension.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    dimension: Option<usize>,
    data: Vec<f32>,
    rows: usize,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<(), IngestError> {
        if vector.is_empty() {
            return Err(IngestError::EmptyVector);
        }
        let expected = *self.dimension.get_or_insert(vector.len());
        if vector.len() != expected {
            return Err(IngestError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Returns `None` when nothing was added.
    pub fn finalize(self) -> Option<FlatIndex> {
        let dimension = self.dimension?;
        Some(FlatIndex {
            dimension,
            data: self.data,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let dimension = i32::try_from(self.dimension)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "dimension exceeds i32"))?;
        let rows = i64::try_from(self.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "row count exceeds i64"))?;

        writer.write_all(&FOURCC_FLAT_IP)?;
        writer.write_all(&dimension.to_le_bytes())?;
        writer.write_all(&rows.to_le_bytes())?;
        writer.write_all(&RESERVED_HEADER_VALUE.to_le_bytes())?;
        writer.write_all(&RESERVED_HEADER_VALUE.to_le_bytes())?;
        writer.write_all(&[1u8])?;
        writer.write_all(&METRIC_INNER_PRODUCT.to_le_bytes())?;
        writer.write_all(&(self.data.len() as u64).to_le_bytes())?;
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }
        writer.flush()
    }

    pub fn read_from<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut fourcc = [0u8; 4];
        reader.read_exact(&mut fourcc)?;
        if fourcc != FOURCC_FLAT_IP {
            return Err(invalid_data("not a flat inner-product index"));
        }

        let dimension = read_i32(&mut reader)?;
        let rows = read_i64(&mut reader)?;
        read_i64(&mut reader)?;
        read_i64(&mut reader)?;
        let mut trained = [0u8; 1];
        reader.read_exact(&mut trained)?;
        if read_i32(&mut reader)? != METRIC_INNER_PRODUCT {
            return Err(invalid_data("index metric is not inner product"));
        }

        let dimension =
            usize::try_from(dimension).map_err(|_| invalid_data("negative dimension"))?;
        let rows = usize::try_from(rows).map_err(|_| invalid_data("negative row count"))?;
        if dimension == 0 {
            return Err(invalid_data("zero dimension"));
        }

        let mut count = [0u8; 8];
        reader.read_exact(&mut count)?;
        let count = u64::from_le_bytes(count) as usize;
        if Some(count) != rows.checked_mul(dimension) {
            return Err(invalid_data("vector payload does not match header"));
        }

        // The header is untrusted until the payload has actually been read.
        let mut data = Vec::with_capacity(count.min(MAX_PREALLOCATED_VALUES));
        let mut value = [0u8; 4];
        for _ in 0..count {
            reader.read_exact(&mut value)?;
            data.push(f32::from_le_bytes(value));
        }

        Ok(Self { dimension, data })
    }
}

fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_vector_fixes_dimension() {
        let mut builder = IndexBuilder::new();
        builder.add(&[1.0, 0.0, 0.0]).expect("first add");
        builder.add(&[0.0, 1.0, 0.0]).expect("same dimension");

        let error = builder.add(&[1.0, 0.0]).expect_err("mismatch must fail");
        assert!(matches!(
            error,
            IngestError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn oversized_header_fails_without_allocating_it() {
        let rows: i64 = 1 << 40;
        let dimension: i32 = 4;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&FOURCC_FLAT_IP);
        bytes.extend_from_slice(&dimension.to_le_bytes());
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&RESERVED_HEADER_VALUE.to_le_bytes());
        bytes.extend_from_slice(&RESERVED_HEADER_VALUE.to_le_bytes());
        bytes.push(1);
        bytes.extend_from_slice(&METRIC_INNER_PRODUCT.to_le_bytes());
        bytes.extend_from_slice(&((rows as u64) * 4).to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());

        let error = FlatIndex::read_from(bytes.as_slice()).expect_err("payload is truncated");
        assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn zero_length_vectors_are_rejected() {
        let mut builder = IndexBuilder::new();
        let empty: [f32; 0] = [];
        assert!(matches!(builder.add(&empty), Err(IngestError::EmptyVector)));
        assert_eq!(builder.dimension(), None);
    }

    #[test]
    fn empty_builder_finalizes_to_nothing() {
        assert!(IndexBuilder::new().finalize().is_none());
    }

    #[test]
    fn rows_keep_insertion_order() {
        let mut builder = IndexBuilder::new();
        builder.add(&[1.0, 0.0]).expect("add");
        builder.add(&[0.0, 1.0]).expect("add");
        let index = builder.finalize().expect("non-empty");

        assert_eq!(index.len(), 2);
        assert_eq!(index.row(0), Some(&[1.0, 0.0][..]));
        assert_eq!(index.row(1), Some(&[0.0, 1.0][..]));
        assert_eq!(index.row(2), None);
    }

    #[test]
    fn serialized_header_matches_faiss_flat_ip_layout() {
        let mut builder = IndexBuilder::new();
        builder.add(&[0.6, 0.8]).expect("add");
        let index = builder.finalize().expect("non-empty");

        let mut bytes = Vec::new();
        index.write_to(&mut bytes).expect("write");

        assert_eq!(&bytes[0..4], b"IxFI");
        assert_eq!(i32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);
        assert_eq!(i64::from_le_bytes(bytes[8..16].try_into().unwrap()), 1);
        assert_eq!(i64::from_le_bytes(bytes[16..24].try_into().unwrap()), 1 << 20);
        assert_eq!(bytes[32], 1);
        assert_eq!(i32::from_le_bytes(bytes[33..37].try_into().unwrap()), 0);
        assert_eq!(u64::from_le_bytes(bytes[37..45].try_into().unwrap()), 2);
        assert_eq!(bytes.len(), 45 + 2 * 4);

        let restored = FlatIndex::read_from(bytes.as_slice()).expect("read");
        assert_eq!(restored, index);
    }

    #[test]
    fn reader_rejects_other_index_types() {
        let bytes = b"IxF2\0\0\0\0".to_vec();
        let error = FlatIndex::read_from(bytes.as_slice()).expect_err("wrong fourcc");
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}
