use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub number: u32,
    pub text: String,
}

/// Source of raw per-page text for a document.
pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| {
            IngestError::PdfParse(format!("{}: {error}", path.display()))
        })?;

        let page_numbers = document.get_pages();
        if page_numbers.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        let pages = page_numbers
            .into_keys()
            .map(|page_no| {
                // Pages without decodable text still count, they just carry no chunks.
                let text = document.extract_text(&[page_no]).unwrap_or_else(|error| {
                    debug!(path = %path.display(), page = page_no, %error, "page text unavailable");
                    String::new()
                });
                PageText {
                    number: page_no,
                    text,
                }
            })
            .collect();

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::extract_page_texts;
    use crate::IngestError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn unreadable_pdf_reports_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_page_texts(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn missing_file_reports_parse_error() {
        let result = extract_page_texts(std::path::Path::new("/nonexistent/nowhere.pdf"));
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }
}
