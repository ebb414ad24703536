use crate::embeddings::RetryPolicy;
use crate::error::IngestError;
use crate::persist::IndexArtifacts;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INPUT_DIR: &str = "data/pdfs";
pub const DEFAULT_OUTPUT_DIR: &str = "data/index";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_CHUNK_SIZE: usize = 1_200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_EMBED_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Settings for one indexing run, validated once before any document is read.
#[derive(Debug, Clone)]
pub struct IndexingOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub embedding_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Upper bound on embedding requests in flight.
    pub embed_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub request_timeout: Duration,
    /// Base URL of the embedding service.
    pub api_base: String,
    pub api_key: Option<String>,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            api_base: crate::embeddings::DEFAULT_GEMINI_BASE_URL.to_string(),
            api_key: None,
        }
    }
}

impl IndexingOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        self.validate_without_credential()?;

        let has_key = self
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if !has_key {
            return Err(IngestError::Config(
                "embedding service credential is missing (set GEMINI_API_KEY)".to_string(),
            ));
        }

        Ok(())
    }

    /// Checks everything except the credential, for embedding services that need none.
    pub fn validate_without_credential(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::Config("chunk size must be positive".to_string()));
        }
        if self.embed_concurrency == 0 {
            return Err(IngestError::Config(
                "embedding concurrency must be positive".to_string(),
            ));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(IngestError::Config(
                "embedding model identifier is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One docstore entry. Position `id` in the docstore matches row `id` in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: u64,
    pub file: String,
    pub page: u32,
    pub chunk_id: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub enum IndexingOutcome {
    Indexed {
        chunk_count: usize,
        dimension: usize,
        documents: usize,
        artifacts: IndexArtifacts,
        skipped: Vec<SkippedPdf>,
    },
    NoDocuments {
        input_dir: PathBuf,
    },
    NoChunks {
        documents: usize,
        skipped: Vec<SkippedPdf>,
    },
}

impl IndexingOutcome {
    pub fn skipped(&self) -> &[SkippedPdf] {
        match self {
            Self::Indexed { skipped, .. } | Self::NoChunks { skipped, .. } => skipped,
            Self::NoDocuments { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_key() -> IndexingOptions {
        IndexingOptions {
            api_key: Some("secret".to_string()),
            ..IndexingOptions::default()
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = IndexingOptions::default();
        assert_eq!(options.input_dir, PathBuf::from("data/pdfs"));
        assert_eq!(options.output_dir, PathBuf::from("data/index"));
        assert_eq!(options.chunk_size, 1_200);
        assert_eq!(options.chunk_overlap, 200);
        assert_eq!(options.embedding_model, "text-embedding-004");
    }

    #[test]
    fn missing_or_blank_credential_is_fatal() {
        let missing = IndexingOptions::default();
        assert!(matches!(missing.validate(), Err(IngestError::Config(_))));

        let blank = IndexingOptions {
            api_key: Some("   ".to_string()),
            ..IndexingOptions::default()
        };
        assert!(matches!(blank.validate(), Err(IngestError::Config(_))));

        assert!(with_key().validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_rejected_but_large_overlap_is_not() {
        let zero = IndexingOptions {
            chunk_size: 0,
            ..with_key()
        };
        assert!(zero.validate().is_err());

        let overlapping = IndexingOptions {
            chunk_size: 10,
            chunk_overlap: 50,
            ..with_key()
        };
        assert!(overlapping.validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let options = IndexingOptions {
            embed_concurrency: 0,
            ..with_key()
        };
        assert!(options.validate().is_err());
    }
}
