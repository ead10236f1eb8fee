#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use fancy_regex::Regex;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::{Document, DocumentMetadata};

const DOCX_BODY_ENTRY: &str = "word/document.xml";

/// Runs of text, tabs, line breaks and paragraph ends inside `word/document.xml`
static DOCX_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab\s*/>|<w:br\s*/>|<w:cr\s*/>|</w:p>")
        .expect("docx token pattern is valid")
});

/// Read a plain text file as a single document, without any format detection
#[inline]
pub fn load_plain_text(path: &Path) -> Result<Vec<Document>> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read text file: {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();

    debug!("Loaded {} bytes of text from {}", bytes.len(), path.display());
    Ok(vec![Document::new(text, file_metadata(path))])
}

/// Extract the text layer of a PDF
#[inline]
pub fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    if !path.is_file() {
        return Err(anyhow!("PDF file not found: {}", path.display()));
    }

    let owned_path = path.to_path_buf();
    // pdf-extract panics on some malformed inputs instead of returning an error
    let extracted = std::panic::catch_unwind(move || pdf_extract::extract_text(&owned_path))
        .map_err(|_| anyhow!("PDF parser aborted on malformed file: {}", path.display()))?
        .map_err(|e| anyhow!("Failed to extract text from PDF {}: {}", path.display(), e))?;

    if extracted.trim().is_empty() {
        warn!("PDF {} has no extractable text layer", path.display());
    }

    Ok(vec![Document::new(extracted, file_metadata(path))])
}

/// Extract paragraph text from a Word document
#[inline]
pub fn load_docx(path: &Path) -> Result<Vec<Document>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open DOCX file: {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Not a valid DOCX archive: {}", path.display()))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY_ENTRY)
        .with_context(|| format!("DOCX archive has no {}: {}", DOCX_BODY_ENTRY, path.display()))?
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read {} from {}", DOCX_BODY_ENTRY, path.display()))?;

    let text = docx_xml_to_text(&xml)?;
    debug!(
        "Extracted {} characters from DOCX {}",
        text.len(),
        path.display()
    );

    Ok(vec![Document::new(text, file_metadata(path))])
}

/// Flatten WordprocessingML into plain text, one line per paragraph
#[inline]
pub fn docx_xml_to_text(xml: &str) -> Result<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for captures in DOCX_TOKEN.captures_iter(xml) {
        let captures = captures.context("Failed to scan DOCX markup")?;

        if let Some(run) = captures.get(1) {
            current.push_str(&unescape_xml(run.as_str()));
            continue;
        }

        let Some(token) = captures.get(0) else {
            continue;
        };
        let token = token.as_str();

        if token.starts_with("<w:tab") {
            current.push('\t');
        } else if token.starts_with("<w:br") || token.starts_with("<w:cr") {
            current.push('\n');
        } else if token == "</w:p>" {
            paragraphs.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    let text = paragraphs
        .iter()
        .map(|paragraph| paragraph.trim_end())
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(text)
}

fn unescape_xml(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(rest.get(..amp).unwrap_or_default());
        let tail = rest.get(amp..).unwrap_or_default();

        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };

        let entity = tail.get(1..semi).unwrap_or_default();
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => decode_numeric_entity(entity),
        };

        match decoded {
            Some(ch) => out.push(ch),
            None => out.push_str(tail.get(..=semi).unwrap_or_default()),
        }
        rest = tail.get(semi + 1..).unwrap_or_default();
    }

    out.push_str(rest);
    out
}

fn decode_numeric_entity(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse().ok()?,
    };
    char::from_u32(code)
}

fn file_metadata(path: &Path) -> DocumentMetadata {
    let title = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let created_time = fs::metadata(path)
        .ok()
        .and_then(|meta| meta.created().or_else(|_| meta.modified()).ok())
        .map(DateTime::<Utc>::from);

    DocumentMetadata {
        source: path.display().to_string(),
        title,
        created_time,
        page_id: None,
    }
}
