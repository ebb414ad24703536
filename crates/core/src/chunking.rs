use crate::error::IngestError;
use crate::models::IndexingOptions;

/// Sliding-window parameters, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Result<Self, IngestError> {
        if size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be at least one character".to_string(),
            ));
        }
        Ok(Self { size, overlap })
    }

    /// Distance between consecutive window starts. Never zero, even when `overlap >= size`.
    pub fn step(&self) -> usize {
        self.size.saturating_sub(self.overlap).max(1)
    }
}

impl TryFrom<&IndexingOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &IndexingOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Splits page text into overlapping windows of `config.size` characters.
///
/// The text is trimmed and stripped of carriage returns first. Every window is trimmed,
/// and windows that are blank after trimming are dropped without affecting the position
/// of the windows that follow.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let cleaned = text.trim().replace('\r', "");

    let boundaries: Vec<usize> = cleaned
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(cleaned.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    let step = config.step();

    let mut chunks = Vec::with_capacity(char_len / step + 1);
    let mut start = 0;
    while start < char_len {
        let end = start.saturating_add(config.size).min(char_len);
        let window = cleaned[boundaries[start]..boundaries[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        start += step;
    }

    chunks
}
