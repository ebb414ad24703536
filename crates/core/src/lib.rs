//! Turns a folder of PDFs into a persisted flat inner-product index plus an aligned
//! JSON docstore.
//!
//! The flow is [`discover_pdf_files`] → [`PdfExtractor`] → [`chunk_text`] →
//! [`EmbeddingClient`] → [`IndexBuilder`] + [`DocStore`] → [`persist_pair`], driven by
//! [`IndexingPipeline`].

pub mod chunking;
pub mod docstore;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod persist;

pub use chunking::{chunk_text, ChunkingConfig};
pub use docstore::DocStore;
pub use embeddings::{
    l2_normalize, EmbeddingClient, EmbeddingService, GeminiEmbeddingService,
    HashingEmbeddingService, RetryPolicy, DEFAULT_GEMINI_BASE_URL,
};
pub use error::{EmbeddingError, IngestError, PipelineStage};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{FlatIndex, IndexBuilder};
pub use ingest::{collect_chunks, collect_chunks_until, discover_pdf_files, ChunkCollection};
pub use models::{ChunkRecord, IndexingOptions, IndexingOutcome, SkippedPdf};
pub use orchestrator::IndexingPipeline;
pub use persist::{persist_pair, IndexArtifacts, DOCSTORE_FILE_NAME, INDEX_FILE_NAME};
