use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use kgforge_core::error::{KgError, Result};

const DOCUMENT_PART: &str = "word/document.xml";

/// Read an ingestion document as plain text.
///
/// `.docx` files yield their body paragraphs joined by blank lines, with empty
/// paragraphs dropped; anything else is read as UTF-8 text.
pub async fn read_document(path: &Path) -> Result<String> {
    let is_docx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));

    if is_docx {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| KgError::Input(format!("Failed to read {}: {e}", path.display())))?;
        let text = docx_text(&bytes)
            .map_err(|e| KgError::Input(format!("Failed to read {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), chars = text.chars().count(), "Read Word document");
        Ok(text)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KgError::Input(format!("Failed to read {}: {e}", path.display())))
    }
}

/// Paragraph text of a Word document held in memory.
pub fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| KgError::Input(format!("Not a Word document: {e}")))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| KgError::Input(format!("Missing {DOCUMENT_PART}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| KgError::Input(format!("Unreadable {DOCUMENT_PART}: {e}")))?;

    let paragraphs = body_paragraphs(&xml)?;
    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

/// Top-level body paragraphs in document order. Table cells are skipped.
fn body_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut table_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| KgError::Input(format!("Malformed {DOCUMENT_PART}: {e}")))?;
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:p" if table_depth == 0 => current = Some(String::new()),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if let Some(text) = current.as_mut() {
                    match e.name().as_ref() {
                        b"w:tab" => text.push('\t'),
                        b"w:br" | b"w:cr" => text.push('\n'),
                        _ => {}
                    }
                }
            }
            Event::Text(t) if in_text => {
                if let Some(text) = current.as_mut() {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| KgError::Input(format!("Malformed {DOCUMENT_PART}: {e}")))?;
                    text.push_str(&unescaped);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:p" if table_depth == 0 => {
                    if let Some(text) = current.take() {
                        paragraphs.push(text);
                    }
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}
