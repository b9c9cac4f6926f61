use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("document {0} contains no extractable text")]
    Empty(String),

    #[error("failed to parse {file_name}: {message}")]
    Parse { file_name: String, message: String },

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Text of a single page. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadedDocument {
    pub source_file: String,
    pub pages: Vec<PageText>,
}

impl LoadedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    PlainText,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    pub fn is_supported(file_name: &str) -> bool {
        Self::kind_of(file_name).is_some()
    }

    fn kind_of(file_name: &str) -> Option<DocumentKind> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())?
            .to_lowercase();

        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "md" | "markdown" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }

    pub async fn load_path(&self, path: &Path) -> Result<LoadedDocument, DocumentError> {
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DocumentError::Unsupported(path.display().to_string()))?
            .to_string();

        if !Self::is_supported(&file_name) {
            return Err(DocumentError::Unsupported(file_name));
        }

        let bytes = tokio::fs::read(path).await?;
        self.load_bytes(&file_name, bytes).await
    }

    pub async fn load_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<LoadedDocument, DocumentError> {
        let kind = Self::kind_of(file_name)
            .ok_or_else(|| DocumentError::Unsupported(file_name.to_string()))?;

        let raw_pages = match kind {
            DocumentKind::Pdf => extract_pdf_pages(file_name, bytes).await?,
            DocumentKind::PlainText => {
                let text = String::from_utf8(bytes).map_err(|e| DocumentError::Parse {
                    file_name: file_name.to_string(),
                    message: e.to_string(),
                })?;
                vec![text]
            }
        };

        let pages: Vec<PageText> = raw_pages
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| {
                let text = normalize_text(raw);
                if text.is_empty() {
                    debug!("Skipping empty page {} of {}", i + 1, file_name);
                    None
                } else {
                    Some(PageText {
                        number: i as u32 + 1,
                        text,
                    })
                }
            })
            .collect();

        if pages.is_empty() {
            warn!("No extractable text in {}", file_name);
            return Err(DocumentError::Empty(file_name.to_string()));
        }

        Ok(LoadedDocument {
            source_file: file_name.to_string(),
            pages,
        })
    }
}

async fn extract_pdf_pages(file_name: &str, bytes: Vec<u8>) -> Result<Vec<String>, DocumentError> {
    let parse_error = |message: String| DocumentError::Parse {
        file_name: file_name.to_string(),
        message,
    };

    // pdf-extract is CPU bound and may panic on malformed input.
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| parse_error(format!("extraction task failed: {e}")))?
        .map_err(|e| parse_error(e.to_string()))
}

/// Strips NULs and trailing whitespace, and keeps at most one blank line
/// between paragraphs.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;

    for line in raw.replace('\0', "").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }

        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        out.push_str(line);
        blank_run = 0;
    }

    out
}
