//! Data types for documents and their detected content kind.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunking::SplitStrategy;
use crate::error::{RagError, Result};

/// The kind of content a document holds.
///
/// Detection happens before chunking and selects the splitting heuristic.
/// Binary formats are recognised so they can be rejected with a clear
/// error; parsing them is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Prose in plain text.
    Text,
    /// Markdown with headers and paragraphs.
    Markdown,
    /// HTML markup, chunked as text.
    Html,
    /// Source code, configuration or tabular text.
    Code,
    /// PDF container.
    Pdf,
    /// Office Open XML word document.
    Docx,
    /// Valid UTF-8 without a recognised extension.
    Unknown,
}

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

impl DocumentType {
    /// Detect the document type from its file name and raw bytes.
    ///
    /// Magic bytes win over the extension, so a renamed PDF is still a PDF.
    /// Bytes that are not valid UTF-8 and carry no known signature are
    /// reported as [`RagError::UnsupportedDocumentType`].
    pub fn detect(file_name: &str, bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(PDF_MAGIC) {
            return Ok(Self::Pdf);
        }
        if bytes.starts_with(ZIP_MAGIC) {
            return Ok(Self::Docx);
        }

        let by_extension = Self::from_extension(file_name);
        if let Some(kind @ (Self::Pdf | Self::Docx)) = by_extension {
            return Ok(kind);
        }
        if std::str::from_utf8(bytes).is_err() {
            return Err(RagError::UnsupportedDocumentType(format!(
                "'{file_name}' is not valid UTF-8 text"
            )));
        }
        Ok(by_extension.unwrap_or(Self::Unknown))
    }

    /// Map a file extension to a document type.
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
        let kind = match ext.as_str() {
            "txt" | "text" | "log" => Self::Text,
            "md" | "markdown" | "mdx" => Self::Markdown,
            "html" | "htm" | "xhtml" => Self::Html,
            "rs" | "py" | "js" | "ts" | "go" | "java" | "c" | "h" | "cpp" | "json" | "yaml"
            | "yml" | "toml" | "csv" | "sql" | "sh" => Self::Code,
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            _ => return None,
        };
        Some(kind)
    }

    /// The chunking heuristic for this type, or `None` if it cannot be chunked.
    pub fn split_strategy(self) -> Option<SplitStrategy> {
        match self {
            Self::Text | Self::Html => Some(SplitStrategy::SentenceAware),
            Self::Markdown => Some(SplitStrategy::ParagraphAware),
            Self::Code | Self::Unknown => Some(SplitStrategy::FixedWidth),
            Self::Pdf | Self::Docx => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Code => "code",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A source document owned by a user.
///
/// Documents are ephemeral: they exist only for the duration of an ingest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Stable identifier; point ids are derived from it.
    pub id: String,
    /// The owning user.
    pub user_id: String,
    /// The detected content kind.
    pub document_type: DocumentType,
    /// The text content of the document.
    pub text: String,
}

impl Document {
    /// Create a document.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        document_type: DocumentType,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            document_type,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_override_extension() {
        let kind = DocumentType::detect("notes.txt", b"%PDF-1.7\n...").unwrap();
        assert_eq!(kind, DocumentType::Pdf);
        let kind = DocumentType::detect("report.bin", b"PK\x03\x04rest").unwrap();
        assert_eq!(kind, DocumentType::Docx);
    }

    #[test]
    fn extension_selects_text_kinds() {
        assert_eq!(DocumentType::detect("a.MD", b"# Title").unwrap(), DocumentType::Markdown);
        assert_eq!(DocumentType::detect("a.txt", b"hello").unwrap(), DocumentType::Text);
        assert_eq!(DocumentType::detect("main.rs", b"fn main() {}").unwrap(), DocumentType::Code);
        assert_eq!(DocumentType::detect("README", b"plain").unwrap(), DocumentType::Unknown);
    }

    #[test]
    fn invalid_utf8_is_unsupported() {
        let err = DocumentType::detect("blob.txt", &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, RagError::UnsupportedDocumentType(_)));
    }

    #[test]
    fn binary_types_have_no_strategy() {
        assert!(DocumentType::Pdf.split_strategy().is_none());
        assert!(DocumentType::Docx.split_strategy().is_none());
        assert_eq!(DocumentType::Markdown.split_strategy(), Some(SplitStrategy::ParagraphAware));
    }
}
