//! Source file parsing and text extraction.
//!
//! Guidelines arrive as text exported from PDFs (pages separated by form
//! feeds, as `pdftotext` emits them), markdown, or HTML. Parsing yields
//! labelled sections so every chunk can carry a page or heading label.

use medrag_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Unknown,
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
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }
}

/// A labelled span of a parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSection {
    /// Page (`page 3`) or heading label
    pub label: Option<String>,
    pub text: String,
}

/// Parse a source file into labelled sections.
pub fn parse_file(path: &Path) -> AppResult<Vec<ParsedSection>> {
    let content_type = ContentType::from_path(path);

    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
    {
        return Err(AppError::Knowledge(format!(
            "PDF files are not parsed directly; convert {:?} to text first (e.g. pdftotext)",
            path
        )));
    }

    let bytes = fs::read(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    if bytes.contains(&0) {
        tracing::warn!("Skipping likely binary file: {:?}", path);
        return Err(AppError::Knowledge(format!(
            "Binary file not supported: {:?}",
            path
        )));
    }

    let raw = String::from_utf8_lossy(&bytes);

    let sections = match content_type {
        ContentType::Markdown => parse_markdown(&raw),
        ContentType::Html => vec![ParsedSection {
            label: None,
            text: clean_html(&raw),
        }],
        ContentType::PlainText | ContentType::Unknown => parse_pages(&raw),
    };

    Ok(sections
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect())
}

/// Split text on form feeds; label pages only when there is more than one.
pub fn parse_pages(text: &str) -> Vec<ParsedSection> {
    let pages: Vec<&str> = text.split('\u{c}').collect();
    let paged = pages.len() > 1;

    pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| ParsedSection {
            label: paged.then(|| format!("page {}", i + 1)),
            text: page.trim().to_string(),
        })
        .collect()
}

/// Split markdown on headings; the heading text labels the section.
fn parse_markdown(text: &str) -> Vec<ParsedSection> {
    let mut sections = Vec::new();
    let mut current = ParsedSection {
        label: None,
        text: String::new(),
    };
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }

        if !in_fence && trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if !heading.is_empty() {
                sections.push(std::mem::replace(
                    &mut current,
                    ParsedSection {
                        label: Some(heading.to_string()),
                        text: String::new(),
                    },
                ));
                continue;
            }
        }

        if trimmed.is_empty() || trimmed.chars().all(|c| c == '-' || c == '*' || c == '_') {
            continue;
        }

        current.text.push_str(trimmed);
        current.text.push('\n');
    }

    sections.push(current);
    for section in &mut sections {
        section.text = section.text.trim().to_string();
    }
    sections
}

/// Strip HTML tags, script and style bodies; collapse whitespace.
fn clean_html(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;

    for (i, ch) in text.char_indices() {
        if let Some(end) = skip_until {
            if lower[i..].starts_with(end) {
                skip_until = None;
                in_tag = true;
            }
            continue;
        }

        match ch {
            '<' => {
                in_tag = true;
                if lower[i..].starts_with("<script") {
                    skip_until = Some("</script");
                } else if lower[i..].starts_with("<style") {
                    skip_until = Some("</style");
                }
            }
            '>' if in_tag => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
