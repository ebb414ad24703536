use chrono::Utc;
use clap::Parser;
use pdf_index_core::{
    EmbeddingService, HashingEmbeddingService, IndexingOptions, IndexingOutcome,
    IndexingPipeline, IngestError, LopdfExtractor, PdfExtractor, DEFAULT_GEMINI_BASE_URL,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-index", version, about = "Build a semantic index from a folder of PDFs")]
struct Cli {
    /// Folder containing the PDFs to index.
    #[arg(long, env = "PDF_DIR", default_value = "data/pdfs")]
    input_dir: PathBuf,

    /// Folder that receives index.faiss and docstore.json.
    #[arg(long, env = "RAG_INDEX_DIR", default_value = "data/index")]
    output_dir: PathBuf,

    /// Embedding model identifier.
    #[arg(long, env = "GEMINI_EMBED_MODEL", default_value = "text-embedding-004")]
    embed_model: String,

    /// Characters per chunk.
    #[arg(long, env = "RAG_CHUNK_SIZE", default_value = "1200")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "RAG_CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Maximum embedding requests in flight.
    #[arg(long, env = "RAG_EMBED_CONCURRENCY", default_value = "4")]
    concurrency: usize,

    /// Retries for rate-limited or failed embedding requests.
    #[arg(long, env = "RAG_EMBED_MAX_RETRIES", default_value = "3")]
    max_retries: u32,

    /// Per-request timeout in seconds.
    #[arg(long, env = "RAG_EMBED_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Embedding API base URL.
    #[arg(long, env = "GEMINI_API_BASE", default_value = DEFAULT_GEMINI_BASE_URL)]
    api_base: String,

    /// Embedding API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use the local hashing embedder instead of the remote service.
    #[arg(long, default_value_t = false)]
    offline: bool,
}

impl Cli {
    fn options(&self) -> IndexingOptions {
        IndexingOptions {
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            embedding_model: self.embed_model.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            embed_concurrency: self.concurrency,
            max_retries: self.max_retries,
            request_timeout: Duration::from_secs(self.timeout_secs),
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            ..IndexingOptions::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        offline = cli.offline,
        "pdf-index boot"
    );

    match run(&cli).await {
        Ok(outcome) => {
            report(&outcome);
            ExitCode::SUCCESS
        }
        Err(error) if error.is::<Interrupted>() => {
            warn!("interrupted; no index written");
            eprintln!("{}", failure_message(&error));
            ExitCode::from(130)
        }
        Err(error) => {
            error!(error = %format!("{error:#}"), "indexing failed");
            eprintln!("{}", failure_message(&error));
            ExitCode::FAILURE
        }
    }
}

/// Ctrl-C arrived before the run finished.
#[derive(Debug)]
struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("interrupted; no index written")
    }
}

impl std::error::Error for Interrupted {}

async fn run(cli: &Cli) -> anyhow::Result<IndexingOutcome> {
    let options = cli.options();
    if cli.offline {
        let pipeline =
            IndexingPipeline::new(&options, LopdfExtractor, HashingEmbeddingService::default())?;
        run_until_interrupted(&pipeline).await
    } else {
        let pipeline = IndexingPipeline::gemini(&options)?;
        run_until_interrupted(&pipeline).await
    }
}

/// Dropping the pipeline future on Ctrl-C discards everything built so far.
async fn run_until_interrupted<E, S>(
    pipeline: &IndexingPipeline<E, S>,
) -> anyhow::Result<IndexingOutcome>
where
    E: PdfExtractor + Send + Sync + 'static,
    S: EmbeddingService,
{
    tokio::select! {
        outcome = pipeline.run() => Ok(outcome?),
        _ = tokio::signal::ctrl_c() => Err(Interrupted.into()),
    }
}

fn failure_message(error: &anyhow::Error) -> String {
    if error.is::<Interrupted>() {
        return error.to_string();
    }
    match error.downcast_ref::<IngestError>() {
        Some(ingest) => format!("indexing failed during {}: {ingest}", ingest.stage()),
        None => format!("indexing failed: {error:#}"),
    }
}

fn report(outcome: &IndexingOutcome) {
    for skipped in outcome.skipped() {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
    }
    if !outcome.skipped().is_empty() {
        println!("{} file(s) skipped", outcome.skipped().len());
    }

    match outcome {
        IndexingOutcome::Indexed {
            chunk_count,
            dimension,
            documents,
            artifacts,
            ..
        } => {
            println!(
                "indexed {chunk_count} chunks (d={dimension}) from {documents} document(s) into {}",
                artifacts.dir.display()
            );
        }
        IndexingOutcome::NoDocuments { input_dir } => {
            println!("no PDF files found in {}", input_dir.display());
        }
        IndexingOutcome::NoChunks { documents, .. } => {
            println!("no chunks produced from {documents} document(s); nothing written");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{failure_message, Cli, Interrupted};
    use clap::Parser;
    use pdf_index_core::{EmbeddingError, IngestError};

    #[test]
    fn flags_map_onto_indexing_options() {
        let cli = Cli::parse_from([
            "pdf-index",
            "--input-dir",
            "in",
            "--output-dir",
            "out",
            "--chunk-size",
            "500",
            "--chunk-overlap",
            "50",
            "--concurrency",
            "2",
            "--api-key",
            "k",
        ]);
        let options = cli.options();
        assert_eq!(options.input_dir, std::path::PathBuf::from("in"));
        assert_eq!(options.output_dir, std::path::PathBuf::from("out"));
        assert_eq!(options.chunk_size, 500);
        assert_eq!(options.chunk_overlap, 50);
        assert_eq!(options.embed_concurrency, 2);
        assert_eq!(options.api_key.as_deref(), Some("k"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn failures_name_the_stage() {
        let error = anyhow::Error::from(IngestError::Embedding {
            chunk: 3,
            source: EmbeddingError::Permanent("400".to_string()),
        });
        assert_eq!(
            failure_message(&error),
            "indexing failed during embed: embedding failed for chunk 3: embedding request rejected: 400"
        );

        let config = anyhow::Error::from(IngestError::Config("missing key".to_string()));
        assert!(failure_message(&config).starts_with("indexing failed during configure:"));
    }

    #[test]
    fn interruption_is_distinguishable() {
        let error = anyhow::Error::from(Interrupted);
        assert!(error.is::<Interrupted>());
        assert_eq!(failure_message(&error), "interrupted; no index written");
    }
}
