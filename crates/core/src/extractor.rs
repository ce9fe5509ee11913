use crate::error::IngestError;
use lopdf::Document;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::DocumentParse(error.to_string()))?;

        let pages = document
            .get_pages()
            .into_keys()
            .map(|number| {
                document
                    .extract_text(&[number])
                    .map(|text| PageText { number, text })
                    .map_err(|error| IngestError::DocumentParse(error.to_string()))
            })
            .filter(|page| !matches!(page, Ok(page) if page.text.trim().is_empty()))
            .collect::<Result<Vec<_>, _>>()?;

        if pages.is_empty() {
            return Err(IngestError::DocumentParse(
                "pdf had no readable page text".to_string(),
            ));
        }

        Ok(pages)
    }
}

/// Spools the upload to a temporary file for the extractor. The file is removed
/// when this function returns, on success and on failure alike.
pub fn extract_page_texts(
    extractor: &dyn PdfExtractor,
    bytes: &[u8],
) -> Result<Vec<PageText>, IngestError> {
    let mut spool = tempfile::Builder::new()
        .prefix("docchat-")
        .suffix(".pdf")
        .tempfile()?;
    spool.write_all(bytes)?;
    spool.flush()?;

    let pages = extractor.extract_pages(spool.path());
    close_spool(spool)?;
    pages
}

fn close_spool(spool: NamedTempFile) -> Result<(), IngestError> {
    spool.close().map_err(IngestError::Io)
}

pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    head.windows(5).any(|window| window == b"%PDF-")
}
