use crate::models::ChunkRecord;
use std::io::Write;

/// Chunk metadata kept in lockstep with the vector index: entry `i` describes row `i`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocStore {
    records: Vec<ChunkRecord>,
}

impl DocStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next record.
    ///
    /// # Panics
    ///
    /// When `record.id` is not the current length. Ids are dense and zero-based, so any
    /// other value means the caller broke the traversal order.
    pub fn append(&mut self, record: ChunkRecord) {
        assert_eq!(
            record.id,
            self.records.len() as u64,
            "docstore ids must be dense and zero-based"
        );
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Writes the records as a pretty-printed JSON array.
    pub fn write_json<W: Write>(&self, mut writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(&mut writer, &self.records)?;
        writer.write_all(b"\n").map_err(serde_json::Error::io)?;
        writer.flush().map_err(serde_json::Error::io)
    }
}
