//! Per-page text extraction for manual files (PDF, DOCX, plain text).
//!
//! The segmenter consumes extracted plain text per page, never raw file
//! bytes. PDFs keep their page structure; DOCX and plain text have none and
//! come back as a single page.

use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::models::DocumentText;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Extract a manual's text as pages, dispatching on file extension.
pub fn extract_document(id: &str, title: &str, path: &Path) -> Result<DocumentText, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let pages = match ext.as_str() {
        "pdf" => extract_pdf_pages(&bytes)?,
        "doc" | "docx" => vec![extract_docx(&bytes)?],
        "txt" | "md" => vec![String::from_utf8_lossy(&bytes).into_owned()],
        other => return Err(ExtractError::Unsupported(other.to_string())),
    };

    Ok(DocumentText {
        id: id.to_string(),
        title: title.to_string(),
        pages,
    })
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Docx(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ExtractError::Docx(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ExtractError::Docx(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(ExtractError::Docx(
            "word/document.xml not found".to_string(),
        ));
    }
    extract_w_t_elements(&doc_xml)
}

/// Pull the text runs (`w:t` elements) out of a DOCX document part.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                // Paragraph ends become line breaks so the chunker still
                // sees line structure.
                if e.local_name().as_ref() == b"p" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_returns_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manual.odt");
        std::fs::write(&path, b"foo").unwrap();
        let err = extract_document("m", "m", &path).unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported(_)));
    }

    #[test]
    fn missing_file_returns_io_error() {
        let err = extract_document("m", "m", Path::new("/nonexistent/manual.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manual.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = extract_document("m", "m", &path).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manual.docx");
        std::fs::write(&path, b"not a zip").unwrap();
        let err = extract_document("m", "m", &path).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn plain_text_is_a_single_page() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manual.txt");
        std::fs::write(&path, "Chapter 1\n\nSome body text.").unwrap();
        let doc = extract_document("m1", "Manual One", &path).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0], "Chapter 1\n\nSome body text.");
        assert_eq!(doc.title, "Manual One");
    }

    #[test]
    fn docx_text_runs_are_extracted() {
        // Minimal DOCX: a ZIP holding word/document.xml with two paragraphs.
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("manual.docx");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip_writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip_writer.start_file("word/document.xml", options).unwrap();
        std::io::Write::write_all(
            &mut zip_writer,
            br#"<?xml version="1.0"?><w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Hello</w:t></w:r></w:p><w:p><w:r><w:t>World</w:t></w:r></w:p></w:body></w:document>"#,
        )
        .unwrap();
        zip_writer.finish().unwrap();

        let doc = extract_document("m", "m", &path).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert!(doc.pages[0].contains("Hello"));
        assert!(doc.pages[0].contains("World"));
    }
}
