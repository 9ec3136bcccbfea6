//! Source file parsing and text extraction.

use ragloop_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            _ => Self::PlainText,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
        }
    }
}

/// Extracted text of one source file.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content_type: ContentType,
    pub text: String,
}

/// Line width for rendered HTML; wide enough that the chunker decides the splits.
const HTML_WRAP_WIDTH: usize = 400;

/// Parse a source file and extract clean text.
///
/// Binary files (containing NUL bytes or invalid UTF-8) are rejected.
pub fn parse_file(path: &Path) -> AppResult<ParsedDocument> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    if bytes.contains(&0) {
        return Err(AppError::Knowledge(format!(
            "Binary file not supported: {:?}",
            path
        )));
    }

    let raw = String::from_utf8(bytes)
        .map_err(|_| AppError::Knowledge(format!("File is not valid UTF-8: {:?}", path)))?;

    let content_type = ContentType::from_path(path);
    let text = match content_type {
        ContentType::Markdown => clean_markdown(&raw),
        ContentType::Html => clean_html(&raw),
        ContentType::PlainText => raw.trim().to_string(),
    };

    Ok(ParsedDocument { content_type, text })
}

/// Extract clean text from an HTML page fetched over the network.
pub fn parse_html(html: &str) -> ParsedDocument {
    ParsedDocument {
        content_type: ContentType::Html,
        text: clean_html(html),
    }
}

/// Strip heading markers and fences, keep paragraph breaks.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") || trimmed == "---" {
            continue;
        }

        result.push_str(trimmed.trim_start_matches('#').trim_start());
        result.push('\n');
    }

    collapse_blank_lines(&result)
}

/// Render HTML to plain text; markup and `<head>` content are dropped.
fn clean_html(html: &str) -> String {
    let text = html2text::from_read(html.as_bytes(), HTML_WRAP_WIDTH);
    collapse_blank_lines(&text)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}
