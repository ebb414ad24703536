use crate::chunking::ChunkingConfig;
use crate::docstore::DocStore;
use crate::embeddings::{EmbeddingClient, EmbeddingService, GeminiEmbeddingService};
use crate::error::IngestError;
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::IndexBuilder;
use crate::ingest::{collect_chunks_until, discover_pdf_files, ChunkCollection};
use crate::models::{ChunkRecord, IndexingOptions, IndexingOutcome};
use crate::persist::persist_pair;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs one indexing pass: enumerate, extract, chunk, embed, append, persist.
///
/// Embedding requests run up to `embed_concurrency` at a time, but results are appended
/// strictly in chunk-id order by this single writer. Nothing touches the output directory
/// until every chunk has been embedded, so an error or a dropped future leaves any
/// previously persisted pair as it was.
///
/// Discovery and extraction run on the blocking pool so a caller racing [`run`] against a
/// signal sees it promptly; dropping the future stops extraction before the next document.
///
/// [`run`]: IndexingPipeline::run
pub struct IndexingPipeline<E, S> {
    extractor: Arc<E>,
    client: EmbeddingClient<S>,
    chunking: ChunkingConfig,
    input_dir: PathBuf,
    output_dir: PathBuf,
    concurrency: usize,
}

impl IndexingPipeline<LopdfExtractor, GeminiEmbeddingService> {
    /// Pipeline backed by lopdf and the Gemini embedding API. Requires a credential.
    pub fn gemini(options: &IndexingOptions) -> Result<Self, IngestError> {
        options.validate()?;
        let api_key = options.api_key.as_deref().unwrap_or_default();
        let service = GeminiEmbeddingService::new(
            &options.api_base,
            &options.embedding_model,
            api_key,
            options.request_timeout,
        )?;
        Self::new(options, LopdfExtractor, service)
    }
}

impl<E, S> IndexingPipeline<E, S>
where
    E: PdfExtractor + Send + Sync + 'static,
    S: EmbeddingService,
{
    pub fn new(options: &IndexingOptions, extractor: E, service: S) -> Result<Self, IngestError> {
        options.validate_without_credential()?;
        Ok(Self {
            extractor: Arc::new(extractor),
            client: EmbeddingClient::new(service, options.retry_policy()),
            chunking: ChunkingConfig::try_from(options)?,
            input_dir: options.input_dir.clone(),
            output_dir: options.output_dir.clone(),
            concurrency: options.embed_concurrency,
        })
    }

    pub async fn run(&self) -> Result<IndexingOutcome, IngestError> {
        let (files, collection) = self.extract_chunks().await?;
        if files.is_empty() {
            warn!(input_dir = %self.input_dir.display(), "no pdf files found");
            return Ok(IndexingOutcome::NoDocuments {
                input_dir: self.input_dir.clone(),
            });
        }
        if collection.chunks.is_empty() {
            warn!(documents = files.len(), skipped = collection.skipped.len(), "no chunks produced");
            return Ok(IndexingOutcome::NoChunks {
                documents: files.len(),
                skipped: collection.skipped,
            });
        }

        let chunk_count = collection.chunks.len();
        info!(chunk_count, concurrency = self.concurrency, "embedding chunks");
        let (builder, docstore) = self.embed_in_order(collection.chunks).await?;

        let Some(index) = builder.finalize() else {
            return Ok(IndexingOutcome::NoChunks {
                documents: files.len(),
                skipped: collection.skipped,
            });
        };

        let artifacts = persist_pair(&index, &docstore, &self.output_dir)?;
        info!(
            chunk_count,
            dimension = index.dimension(),
            output_dir = %artifacts.dir.display(),
            "index saved"
        );

        Ok(IndexingOutcome::Indexed {
            chunk_count,
            dimension: index.dimension(),
            documents: files.len(),
            artifacts,
            skipped: collection.skipped,
        })
    }

    async fn extract_chunks(&self) -> Result<(Vec<PathBuf>, ChunkCollection), IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let input_dir = self.input_dir.clone();
        let chunking = self.chunking;
        let cancelled = Arc::new(AtomicBool::new(false));
        let _cancel_on_drop = CancelOnDrop(Arc::clone(&cancelled));

        tokio::task::spawn_blocking(move || {
            let files = discover_pdf_files(&input_dir);
            if files.is_empty() {
                return (files, ChunkCollection::default());
            }
            info!(input_dir = %input_dir.display(), documents = files.len(), "discovered pdf files");
            let collection = collect_chunks_until(&files, extractor.as_ref(), chunking, &cancelled);
            (files, collection)
        })
        .await
        .map_err(|error| IngestError::ExtractionTask(error.to_string()))
    }

    async fn embed_in_order(
        &self,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(IndexBuilder, DocStore), IngestError> {
        let client = &self.client;
        let mut embedded = std::pin::pin!(stream::iter(chunks)
            .map(|chunk| async move {
                match client.embed(&chunk.text).await {
                    Ok(vector) => Ok((chunk, vector)),
                    Err(source) => Err(IngestError::Embedding {
                        chunk: chunk.id,
                        source,
                    }),
                }
            })
            .buffered(self.concurrency));

        let mut builder = IndexBuilder::new();
        let mut docstore = DocStore::new();
        while let Some((chunk, vector)) = embedded.try_next().await? {
            builder.add(&vector)?;
            docstore.append(chunk);
        }

        Ok((builder, docstore))
    }
}

struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}
