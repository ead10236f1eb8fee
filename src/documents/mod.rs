// Documents module
// Source descriptions, the document model and loader selection

pub mod loaders;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub use loaders::{docx_xml_to_text, load_docx, load_pdf, load_plain_text};

/// Metadata carried from a source document onto every chunk cut from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Stable identifier of the source (file path or `notion_page_<id>`)
    pub source: String,
    pub title: String,
    pub created_time: Option<DateTime<Utc>>,
    pub page_id: Option<String>,
}

/// A loaded document, ready for chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    #[inline]
    pub fn new(text: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// Something that can be ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    NotionPage(String),
}

impl Source {
    #[inline]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    #[inline]
    pub fn notion_page(page_id: impl Into<String>) -> Self {
        Self::NotionPage(page_id.into())
    }

    /// Identifier recorded as the `source` of every chunk from this source
    #[inline]
    pub fn id(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::NotionPage(page_id) => notion_source_id(page_id),
        }
    }

    /// The loader family for this source, decided once at the boundary
    #[inline]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::File(path) => SourceKind::for_path(path),
            Self::NotionPage(_) => SourceKind::NotionPage,
        }
    }
}

impl fmt::Display for Source {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[inline]
pub fn notion_source_id(page_id: &str) -> String {
    format!("notion_page_{}", page_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Pdf,
    Docx,
    PlainText,
    NotionPage,
}

impl SourceKind {
    /// Pick a loader family from a file extension; anything unrecognised is read as text
    #[inline]
    pub fn for_path(path: &Path) -> Self {
        let extension = path.extension().and_then(|ext| ext.to_str());
        match extension {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Self::Pdf,
            Some(ext) if ext.eq_ignore_ascii_case("docx") => Self::Docx,
            _ => Self::PlainText,
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::PlainText => "text",
            Self::NotionPage => "notion",
        }
    }
}

impl fmt::Display for SourceKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type FileLoader = fn(&Path) -> Result<Vec<Document>>;

/// Loaders for local files. Notion pages are fetched through a `PageSource` instead.
const FILE_LOADERS: &[(SourceKind, FileLoader)] = &[
    (SourceKind::Pdf, load_pdf),
    (SourceKind::Docx, load_docx),
    (SourceKind::PlainText, load_plain_text),
];

/// Look up the file loader for a source kind
#[inline]
pub fn file_loader(kind: SourceKind) -> Option<FileLoader> {
    FILE_LOADERS
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map(|(_, loader)| *loader)
}

/// Load a local file with the loader its extension selects
#[inline]
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let kind = SourceKind::for_path(path);
    let loader = file_loader(kind)
        .ok_or_else(|| anyhow::anyhow!("No file loader registered for {} sources", kind))?;
    loader(path)
}
