//! Text extraction from CV documents (.pdf, .docx, .txt/.md).
//!
//! Format is decided by extension alone, before the file is touched, so an
//! unsupported format is always reported as such even when the file is missing.

use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::pipeline::StageError;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported document format: {0}")]
    Unsupported(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("document contained no extractable text")]
    Empty,
}

impl From<DocumentError> for StageError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Unsupported(ext) => StageError::UnsupportedFormat(ext),
            DocumentError::Empty => StageError::EmptyDocument,
            other => StageError::Unreadable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    PlainText,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            "txt" | "md" => Ok(DocumentFormat::PlainText),
            "" => Err(DocumentError::Unsupported("(no extension)".to_string())),
            other => Err(DocumentError::Unsupported(format!(".{other}"))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
            DocumentFormat::PlainText => "txt",
        }
    }
}

/// Extracts plain text from a CV. Blocking; call from `spawn_blocking`.
pub fn extract_text(path: &Path) -> Result<String, DocumentError> {
    let format = DocumentFormat::from_path(path)?;

    std::fs::metadata(path).map_err(|e| DocumentError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let raw = match format {
        DocumentFormat::Pdf => {
            pdf_extract::extract_text(path).map_err(|e| DocumentError::Pdf(e.to_string()))?
        }
        DocumentFormat::Docx => extract_docx(path)?,
        DocumentFormat::PlainText => {
            std::fs::read_to_string(path).map_err(|e| DocumentError::Read {
                path: path.to_path_buf(),
                source: e,
            })?
        }
    };

    let text = normalize_lines(&raw);
    if text.is_empty() {
        return Err(DocumentError::Empty);
    }
    Ok(text)
}

fn extract_docx(path: &Path) -> Result<String, DocumentError> {
    let file = std::fs::File::open(path).map_err(|e| DocumentError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| DocumentError::Docx(format!("not a DOCX archive: {e}")))?;

    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| DocumentError::Docx(format!("missing word/document.xml: {e}")))?;

    let mut xml = String::new();
    document_xml
        .read_to_string(&mut xml)
        .map_err(|e| DocumentError::Docx(format!("cannot read word/document.xml: {e}")))?;

    parse_docx_xml(&xml)
}

/// Collects `<w:t>` runs, one line per `<w:p>` paragraph.
fn parse_docx_xml(xml: &str) -> Result<String, DocumentError> {
    // Untrimmed: an entity reference splits one run into several text events.
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let decoded = e
                    .decode()
                    .map_err(|e| DocumentError::Docx(format!("text decoding error: {e}")))?;
                text.push_str(&decoded);
            }
            Ok(Event::GeneralRef(e)) if in_text => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else if let Some(resolved) = e
                    .decode()
                    .ok()
                    .and_then(|name| resolve_predefined_entity(&name))
                {
                    text.push_str(resolved);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DocumentError::Docx(format!("XML parsing error: {e}"))),
            _ => {}
        }
    }

    Ok(text)
}

/// Trims each line and collapses runs of blank lines to a single one.
fn normalize_lines(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = false;
    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            blank_run = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn temp_with(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_plain_text_is_read_and_normalized() {
        let file = temp_with(".txt", "  Asha Rao  \n\n\n\nSkills: Rust, Python\n");
        let text = extract_text(file.path()).unwrap();
        assert_eq!(text, "Asha Rao\n\nSkills: Rust, Python");
    }

    #[test]
    fn test_unsupported_extension_is_rejected_before_reading() {
        let err = extract_text(Path::new("/does/not/exist/cv.odt")).unwrap_err();
        assert!(matches!(err, DocumentError::Unsupported(ref ext) if ext == ".odt"));
        assert_eq!(StageError::from(err).kind(), "unsupported_format");
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = extract_text(Path::new("/does/not/exist/cv.pdf")).unwrap_err();
        assert!(matches!(err, DocumentError::Read { .. }));
        assert_eq!(StageError::from(err).kind(), "unreadable");
    }

    #[test]
    fn test_whitespace_only_document_is_empty() {
        let file = temp_with(".md", "   \n\t\n  ");
        let err = extract_text(file.path()).unwrap_err();
        assert!(matches!(err, DocumentError::Empty));
        assert_eq!(StageError::from(err).kind(), "empty_document");
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("CV.PDF")).unwrap(),
            DocumentFormat::Pdf
        );
        assert!(DocumentFormat::from_path(Path::new("cv")).is_err());
    }

    #[test]
    fn test_corrupt_docx_is_unreadable() {
        let file = temp_with(".docx", "this is not a zip archive");
        let err = extract_text(file.path()).unwrap_err();
        assert!(matches!(err, DocumentError::Docx(_)));
    }

    #[test]
    fn test_docx_xml_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Asha Rao</w:t></w:r></w:p>
    <w:p><w:r><w:t>Skills:</w:t></w:r><w:r><w:t xml:space="preserve"> Rust</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = parse_docx_xml(xml).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Asha Rao");
        assert_eq!(lines[1], "Skills: Rust");
    }

    #[test]
    fn test_docx_xml_entities_are_decoded() {
        let xml = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Research &amp; Development</w:t></w:r></w:p>
    <w:p><w:r><w:t>C&#43;&#x2B; &lt;STL&gt;</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = parse_docx_xml(xml).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Research & Development");
        assert_eq!(lines[1], "C++ <STL>");
    }
}
