//! Text readers for uploads that do not need OCR, plus text normalization

use crate::error::{ConsentLexError, Result};
use std::io::{Cursor, Read};

/// Minimum letters/digits for an embedded PDF text layer to be trusted
const MIN_TEXT_LAYER_CHARS: usize = 32;

/// Canonical form of extracted text.
///
/// Line endings become `\n`, form feeds and stray control characters are
/// dropped, trailing whitespace is trimmed and blank-line runs collapse to one.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace(&['\r', '\u{000C}'][..], "\n");

    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;
    for line in unified.split('\n') {
        let cleaned: String = line
            .chars()
            .filter(|c| *c == '\t' || !c.is_control())
            .collect();
        let cleaned = cleaned.trim_end();

        if cleaned.trim().is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
        } else {
            lines.push(cleaned.to_string());
            previous_blank = false;
        }
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Decode a plain-text upload, replacing invalid UTF-8.
pub fn plain_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{FEFF}').unwrap_or(&text).to_string()
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Paragraph text of WordprocessingML markup
fn xml_to_text(xml: &str) -> String {
    let with_breaks = xml
        .replace("</w:p>", "\n")
        .replace("<w:tab/>", "\t")
        .replace("<w:br/>", "\n");

    let mut result = String::with_capacity(with_breaks.len());
    let mut in_tag = false;
    for ch in with_breaks.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    decode_xml_entities(&result)
}

/// Text of the main body of a `.docx` file.
pub fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ConsentLexError::Extraction(format!("not a readable Word document: {e}")))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ConsentLexError::Extraction(format!("Word document has no body: {e}")))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| ConsentLexError::Extraction(format!("could not read document body: {e}")))?;
    Ok(xml_to_text(&xml))
}

/// Embedded text layer of a PDF, if it holds enough text to skip OCR.
///
/// The PDF parser can panic on malformed input; that counts as "no text layer".
pub fn pdf_text_layer(bytes: &[u8]) -> Option<String> {
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
    let text = match extracted {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "no usable PDF text layer");
            return None;
        }
        Err(_) => {
            tracing::warn!("PDF text layer extraction panicked, falling back to OCR");
            return None;
        }
    };

    let meaningful = text.chars().filter(|c| c.is_alphanumeric()).count();
    if meaningful >= MIN_TEXT_LAYER_CHARS {
        Some(text)
    } else {
        tracing::debug!(meaningful, "PDF text layer too thin, treating as scanned");
        None
    }
}
