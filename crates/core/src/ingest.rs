use crate::chunking::{chunk_text, ChunkingConfig};
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::models::{ChunkRecord, SkippedPdf};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// PDF files directly inside `folder`, sorted by path.
///
/// The sort order decides global chunk ids, so it must not depend on how the filesystem
/// happens to list entries. A missing folder yields no files.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

#[derive(Debug, Default)]
pub struct ChunkCollection {
    pub chunks: Vec<ChunkRecord>,
    pub skipped: Vec<SkippedPdf>,
}

/// Extracts and chunks `files` in order, assigning ids `0..n` across the whole traversal.
///
/// Documents that fail to extract are recorded in `skipped` and contribute no chunks.
pub fn collect_chunks<E: PdfExtractor>(
    files: &[PathBuf],
    extractor: &E,
    config: ChunkingConfig,
) -> ChunkCollection {
    collect_chunks_until(files, extractor, config, &AtomicBool::new(false))
}

/// Like [`collect_chunks`], but stops before the next document once `cancelled` is set.
pub fn collect_chunks_until<E: PdfExtractor>(
    files: &[PathBuf],
    extractor: &E,
    config: ChunkingConfig,
    cancelled: &AtomicBool,
) -> ChunkCollection {
    let mut collection = ChunkCollection::default();
    let mut next_id = 0u64;

    for path in files {
        if cancelled.load(Ordering::Relaxed) {
            debug!(path = %path.display(), "extraction cancelled");
            break;
        }
        match chunk_document(path, extractor, config, next_id) {
            Ok(chunks) => {
                debug!(path = %path.display(), chunks = chunks.len(), "chunked document");
                next_id += chunks.len() as u64;
                collection.chunks.extend(chunks);
            }
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                collection.skipped.push(SkippedPdf {
                    path: path.clone(),
                    reason: error.to_string(),
                });
            }
        }
    }

    collection
}

fn chunk_document<E: PdfExtractor>(
    path: &Path,
    extractor: &E,
    config: ChunkingConfig,
    first_id: u64,
) -> Result<Vec<ChunkRecord>, IngestError> {
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.to_path_buf()))?
        .to_string();

    let pages = extractor.extract_pages(path)?;
    let mut chunks = Vec::new();
    let mut next_id = first_id;

    for page in pages {
        for (chunk_id, text) in chunk_text(&page.text, config).into_iter().enumerate() {
            chunks.push(ChunkRecord {
                id: next_id,
                file: file.clone(),
                page: page.number,
                chunk_id,
                text,
            });
            next_id += 1;
        }
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::{collect_chunks, discover_pdf_files};
    use crate::chunking::ChunkingConfig;
    use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
    use crate::IngestError;
    use std::collections::HashMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    struct MapExtractor(HashMap<&'static str, Vec<&'static str>>);

    impl PdfExtractor for MapExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let pages = self
                .0
                .get(name)
                .ok_or_else(|| IngestError::PdfParse(format!("unknown {name}")))?;
            Ok(pages
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.to_string(),
                })
                .collect())
        }
    }

    #[test]
    fn discovery_is_sorted_and_ignores_other_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        fs::create_dir(base.join("nested"))?;
        fs::write(base.join("nested").join("deep.pdf"), b"%PDF")?;
        fs::write(base.join("b.pdf"), b"%PDF")?;
        fs::write(base.join("notes.txt"), b"text")?;
        fs::write(base.join("C.PDF"), b"%PDF")?;
        fs::write(base.join("a.pdf"), b"%PDF")?;

        let names: Vec<_> = discover_pdf_files(base)
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();

        assert_eq!(names, vec!["C.PDF", "a.pdf", "b.pdf"]);
        Ok(())
    }

    #[test]
    fn missing_folder_has_no_files() {
        assert!(discover_pdf_files(Path::new("/nonexistent/pdf/folder")).is_empty());
    }

    #[test]
    fn ids_run_across_documents_and_pages() {
        let extractor = MapExtractor(HashMap::from([
            ("a.pdf", vec!["abcdefgh", "", "xy"]),
            ("b.pdf", vec!["klmn"]),
        ]));
        let files = vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")];
        let config = ChunkingConfig::new(4, 0).expect("config");

        let collection = collect_chunks(&files, &extractor, config);

        let summary: Vec<_> = collection
            .chunks
            .iter()
            .map(|c| (c.id, c.file.as_str(), c.page, c.chunk_id, c.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, "a.pdf", 1, 0, "abcd"),
                (1, "a.pdf", 1, 1, "efgh"),
                (2, "a.pdf", 3, 0, "xy"),
                (3, "b.pdf", 1, 0, "klmn"),
            ]
        );
        assert!(collection.skipped.is_empty());
    }

    #[test]
    fn failed_documents_are_skipped_without_consuming_ids() {
        let extractor = MapExtractor(HashMap::from([("c.pdf", vec!["text"])]));
        let files = vec![PathBuf::from("broken.pdf"), PathBuf::from("c.pdf")];

        let collection = collect_chunks(&files, &extractor, ChunkingConfig::new(10, 2).expect("config"));

        assert_eq!(collection.chunks.len(), 1);
        assert_eq!(collection.chunks[0].id, 0);
        assert_eq!(collection.skipped.len(), 1);
        assert_eq!(collection.skipped[0].path, PathBuf::from("broken.pdf"));
    }

    #[test]
    fn unreadable_pdf_on_disk_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let files = discover_pdf_files(dir.path());
        let collection = collect_chunks(&files, &LopdfExtractor, ChunkingConfig::new(1_200, 200)?);

        assert!(collection.chunks.is_empty());
        assert_eq!(collection.skipped.len(), 1);
        assert_eq!(
            collection.skipped[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }
}
