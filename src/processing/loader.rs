//! Extension-based extractor selection and per-format text extraction.
//!
//! The extension after the final `.` is trusted as-is; there is no content sniffing. Each
//! extractor returns ordered [`SourceUnit`]s: one per page for PDF, one per record for CSV, and
//! one for the remaining whole-text formats.

use super::types::{ServiceError, SourceMetadata, SourceUnit};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure for a recognised format.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The staged file could not be read back.
    #[error("failed to read staged document: {0}")]
    Io(#[from] std::io::Error),
    /// PDF parsing failed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// Word (OOXML) parsing failed.
    #[error("Word extraction failed: {0}")]
    Word(String),
    /// Plain-text file was not valid UTF-8.
    #[error("text file is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    /// CSV parsing failed.
    #[error("CSV extraction failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Document formats with a dedicated extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `.pdf`
    Pdf,
    /// `.docx` and `.doc`
    Word,
    /// `.txt`
    Text,
    /// `.csv`
    Csv,
}

impl DocumentFormat {
    /// Select a format from the filename's extension (case-insensitive).
    ///
    /// Fails with [`ServiceError::UnsupportedFormat`] naming the offending extension. A name
    /// without a `.` is treated as having the whole name as its extension.
    pub fn from_filename(filename: &str) -> Result<Self, ServiceError> {
        let extension = filename
            .rsplit_once('.')
            .map_or(filename, |(_, ext)| ext)
            .to_lowercase();
        match extension.as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" | "doc" => Ok(Self::Word),
            "txt" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            _ => Err(ServiceError::UnsupportedFormat(extension)),
        }
    }

    /// Canonical extension used for the staged file.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "docx",
            Self::Text => "txt",
            Self::Csv => "csv",
        }
    }

    /// Read the staged file at `path` and extract its text units.
    ///
    /// Blocking; call from a blocking task.
    pub fn load(self, path: &Path, source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
        let bytes = std::fs::read(path)?;
        let whole = |text: String| {
            vec![SourceUnit {
                text,
                metadata: SourceMetadata {
                    source: source.to_string(),
                    row: None,
                    page: None,
                },
            }]
        };

        match self {
            Self::Pdf => extract_pdf(&bytes, source),
            Self::Word => extract_docx(&bytes).map(whole),
            Self::Text => Ok(whole(String::from_utf8(bytes)?)),
            Self::Csv => extract_csv(&bytes, source),
        }
    }
}

/// One unit per page; pages without extractable text are skipped but keep their index.
fn extract_pdf(bytes: &[u8], source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(page, text)| SourceUnit {
            text: text.trim().to_string(),
            metadata: SourceMetadata {
                source: source.to_string(),
                row: None,
                page: Some(page),
            },
        })
        .collect())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Word(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Word("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Word(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Word(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

/// Collect `w:t` runs, one line per `w:p` paragraph.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Word(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push('\t'),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Word(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// Render each record as `column: value` lines.
fn extract_csv(bytes: &[u8], source: &str) -> Result<Vec<SourceUnit>, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut units = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let text = record
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                let column = headers.get(idx).unwrap_or("");
                format!("{}: {}", column.trim(), value.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        units.push(SourceUnit {
            text,
            metadata: SourceMetadata {
                source: source.to_string(),
                row: Some(row),
                page: None,
            },
        });
    }
    Ok(units)
}
