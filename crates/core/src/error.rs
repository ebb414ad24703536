use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Configure,
    Enumerate,
    Extract,
    Embed,
    Index,
    Persist,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Enumerate => "enumerate",
            Self::Extract => "extract",
            Self::Embed => "embed",
            Self::Index => "index",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Rate limits, server errors, timeouts and dropped connections.
    #[error("transient embedding failure: {0}")]
    Transient(String),

    #[error("embedding request rejected: {0}")]
    Permanent(String),

    #[error("malformed embedding: {0}")]
    Malformed(String),
}

impl EmbeddingError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
            Self::Transient(error.to_string())
        } else if error.is_decode() {
            Self::Malformed(error.to_string())
        } else {
            Self::Permanent(error.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("extraction task failed: {0}")]
    ExtractionTask(String),

    #[error("path has no file name: {0}")]
    MissingFileName(PathBuf),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("embedding failed for chunk {chunk}: {source}")]
    Embedding {
        chunk: u64,
        #[source]
        source: EmbeddingError,
    },

    #[error("embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot index a zero-length vector")]
    EmptyVector,

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to persist {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

impl IngestError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Config(_) | Self::InvalidChunkConfig(_) | Self::Url(_) => {
                PipelineStage::Configure
            }
            Self::PdfParse(_) | Self::MissingFileName(_) | Self::ExtractionTask(_) => {
                PipelineStage::Extract
            }
            Self::Embedding { .. } => PipelineStage::Embed,
            Self::DimensionMismatch { .. } | Self::EmptyVector => PipelineStage::Index,
            Self::Io(_) | Self::Serialization(_) | Self::Persist { .. } => PipelineStage::Persist,
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
