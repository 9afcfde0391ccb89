//! Page-range splitting of PDFs for chunked OCR submission

use crate::error::{ConsentLexError, Result};
use lopdf::Document;

/// Split `bytes` into standalone PDFs of at most `pages_per_chunk` pages each.
///
/// Chunks are returned in page order. A document that already fits in one
/// chunk is returned unchanged.
pub fn split_pdf(bytes: &[u8], pages_per_chunk: usize) -> Result<Vec<Vec<u8>>> {
    let per_chunk = pages_per_chunk.max(1);
    let doc = Document::load_mem(bytes)
        .map_err(|e| ConsentLexError::Validation(format!("unreadable PDF: {e}")))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(ConsentLexError::Validation("PDF has no pages".to_string()));
    }
    if page_numbers.len() <= per_chunk {
        return Ok(vec![bytes.to_vec()]);
    }

    let mut chunks = Vec::with_capacity(page_numbers.len().div_ceil(per_chunk));
    for range in page_numbers.chunks(per_chunk) {
        let drop: Vec<u32> = page_numbers
            .iter()
            .copied()
            .filter(|n| !range.contains(n))
            .collect();

        let mut part = doc.clone();
        part.delete_pages(&drop);
        part.prune_objects();

        let mut out = Vec::new();
        part.save_to(&mut out).map_err(|e| {
            ConsentLexError::Extraction(format!(
                "could not write pages {}-{}: {e}",
                range[0],
                range[range.len() - 1]
            ))
        })?;
        chunks.push(out);
    }

    tracing::debug!(
        pages = page_numbers.len(),
        chunks = chunks.len(),
        per_chunk,
        "split PDF for OCR"
    );
    Ok(chunks)
}
