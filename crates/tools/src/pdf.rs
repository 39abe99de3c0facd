//! PDF text extraction and keyword search.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolwright_core::error::ToolError;
use toolwright_core::schema::{FieldKind, FieldSpec, ToolSchema};
use toolwright_core::tool::{Tool, parse_arguments};
use tracing::{debug, warn};

use crate::http;

const UPSTREAM: &str = "PDF host";
const DEFAULT_CONTEXT_WINDOW: usize = 200;

pub struct PdfReaderTool {
    client: reqwest::Client,
}

impl PdfReaderTool {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, source: &str) -> Result<Vec<u8>, ToolError> {
        if source.starts_with("http") {
            let response = self
                .client
                .get(source)
                .send()
                .await
                .map_err(|e| http::transport_error(self.name(), UPSTREAM, e))?;
            if !response.status().is_success() {
                return Err(ToolError::failed(
                    self.name(),
                    format!("Failed to fetch PDF from URL: {}", response.status()),
                ));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| http::decode_error(self.name(), UPSTREAM, e))?;
            Ok(bytes.to_vec())
        } else {
            tokio::fs::read(source)
                .await
                .map_err(|e| ToolError::failed(self.name(), format!("Failed to read {source}: {e}")))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PdfArgs {
    source: String,
    pages: Option<Vec<f64>>,
    query: Option<String>,
    context_window: Option<f64>,
}

/// Extracted text and the document's page count.
struct Extracted {
    text: String,
    total_pages: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextReport {
    success: bool,
    text: String,
    total_pages: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchReport {
    success: bool,
    results: Vec<Snippet>,
    total_pages: usize,
    message: String,
}

#[derive(Serialize)]
struct Snippet {
    snippet: String,
}

fn extract(bytes: &[u8], wanted: Option<&[u32]>) -> Result<Extracted, String> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| format!("The PDF could not be read: {e}"))?;
    let all: Vec<u32> = document.get_pages().keys().copied().collect();
    let selected: Vec<u32> = match wanted {
        Some(pages) => all.iter().copied().filter(|p| pages.contains(p)).collect(),
        None => all.clone(),
    };
    let text = if selected.is_empty() {
        String::new()
    } else {
        document
            .extract_text(&selected)
            .map_err(|e| format!("Failed to extract text: {e}"))?
    };
    Ok(Extracted {
        text: text.trim().to_string(),
        total_pages: all.len(),
    })
}

/// Case-insensitive pattern; a query that is not a valid regex is matched literally.
fn query_pattern(query: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
        })
}

fn back_chars(text: &str, at: usize, n: usize) -> usize {
    if n == 0 {
        return at;
    }
    text[..at]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn forward_chars(text: &str, at: usize, n: usize) -> usize {
    text[at..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| at + i)
        .unwrap_or(text.len())
}

fn snippets(text: &str, pattern: &Regex, window: usize) -> Vec<Snippet> {
    pattern
        .find_iter(text)
        .filter(|m| !m.is_empty())
        .map(|m| {
            let start = back_chars(text, m.start(), window);
            let end = forward_chars(text, m.end(), window);
            Snippet {
                snippet: highlight(&text[start..end], pattern),
            }
        })
        .collect()
}

/// Wrap every non-empty match in `**`.
fn highlight(text: &str, pattern: &Regex) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in pattern.find_iter(text).filter(|m| !m.is_empty()) {
        out.push_str(&text[last..m.start()]);
        out.push_str("**");
        out.push_str(m.as_str());
        out.push_str("**");
        last = m.end();
    }
    out.push_str(&text[last..]);
    out
}

#[async_trait]
impl Tool for PdfReaderTool {
    fn name(&self) -> &str {
        "read_pdf"
    }

    fn description(&self) -> &str {
        "Reads and extracts text from a PDF document specified by a URL or local file path. \
         Can target specific pages or search for keywords within the document, returning relevant snippets with context."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            FieldSpec::required(
                "source",
                FieldKind::String,
                "The local file path or the URL of the PDF document",
            ),
            FieldSpec::optional(
                "pages",
                FieldKind::Array(Box::new(FieldKind::Integer)),
                "An optional array of page numbers to extract text from",
            )
            .min(1.0),
            FieldSpec::optional(
                "query",
                FieldKind::String,
                "An optional keyword or phrase to search for within the PDF content",
            ),
            FieldSpec::optional(
                "contextWindow",
                FieldKind::Integer,
                "The number of characters before and after a keyword match to include for context",
            )
            .min(0.0),
        ])
    }

    async fn call(&self, arguments: Value) -> Result<String, ToolError> {
        let args: PdfArgs = parse_arguments(self.name(), arguments)?;
        let bytes = self.fetch(&args.source).await?;
        let pages: Option<Vec<u32>> = args
            .pages
            .map(|p| p.into_iter().map(|n| n as u32).collect());

        // Parsing is CPU-bound
        let extracted = tokio::task::spawn_blocking(move || extract(&bytes, pages.as_deref()))
            .await
            .map_err(|e| ToolError::failed("read_pdf", format!("PDF worker failed: {e}")))?
            .map_err(|reason| {
                warn!(source = %args.source, %reason, "PDF extraction failed");
                ToolError::failed("read_pdf", reason)
            })?;
        debug!(
            source = %args.source,
            pages = extracted.total_pages,
            chars = extracted.text.len(),
            "Extracted PDF text"
        );

        let body = match args.query.filter(|q| !q.is_empty()) {
            Some(query) => {
                let pattern = query_pattern(&query)
                    .map_err(|e| ToolError::failed(self.name(), format!("Invalid query: {e}")))?;
                let window = args
                    .context_window
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_CONTEXT_WINDOW);
                let results = snippets(&extracted.text, &pattern, window);
                let message = if results.is_empty() {
                    format!("No occurrences found for \"{query}\".")
                } else {
                    format!(
                        "Found {} occurrences for \"{query}\". Note: Page numbers are not precise for snippets from the full document text.",
                        results.len()
                    )
                };
                serde_json::to_string(&SearchReport {
                    success: true,
                    results,
                    total_pages: extracted.total_pages,
                    message,
                })
            }
            None => serde_json::to_string(&TextReport {
                success: true,
                text: extracted.text,
                total_pages: extracted.total_pages,
            }),
        };
        body.map_err(|e| ToolError::failed(self.name(), e.to_string()))
    }
}
