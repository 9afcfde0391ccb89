//! Upload validation: extension, magic bytes and size

use crate::error::{ConsentLexError, Result};

/// Extensions accepted at the upload boundary
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "pdf", "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp", "txt", "md", "docx",
];

pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// How a validated upload gets its text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Image,
    PlainText,
    WordProcessor,
}

/// Accepted upload with its canonical media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub kind: UploadKind,
    pub media_type: String,
}

pub fn extension_of(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Media type implied by the file name, `application/octet-stream` if unknown
pub fn media_type_for(filename: &str) -> String {
    match extension_of(filename).as_deref() {
        Some("docx") => DOCX_MEDIA_TYPE.to_string(),
        Some("md") => "text/markdown".to_string(),
        Some("tif") | Some("tiff") => "image/tiff".to_string(),
        Some(ext) => mime_guess::from_ext(ext)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        None => "application/octet-stream".to_string(),
    }
}

fn unsupported(message: String) -> ConsentLexError {
    ConsentLexError::Validation(format!("unsupported file: {message}"))
}

/// Check `filename` and `bytes` against the accepted set.
///
/// Binary formats must carry the magic bytes of the type their extension
/// claims; text formats must not sniff as a binary type.
pub fn validate_upload(filename: &str, bytes: &[u8], max_bytes: usize) -> Result<ValidatedUpload> {
    let ext = extension_of(filename)
        .ok_or_else(|| unsupported(format!("{filename} has no extension")))?;
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(unsupported(format!(
            ".{ext} is not accepted (use one of: {})",
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    if bytes.is_empty() {
        return Err(unsupported(format!("{filename} is empty")));
    }
    if bytes.len() > max_bytes {
        return Err(unsupported(format!(
            "{filename} is {} bytes, the limit is {} bytes",
            bytes.len(),
            max_bytes
        )));
    }

    let media_type = media_type_for(filename);
    let sniffed = infer::get(bytes).map(|t| t.mime_type());

    let kind = match ext.as_str() {
        "txt" | "md" => {
            if let Some(found) = sniffed.filter(|m| !m.starts_with("text/")) {
                return Err(unsupported(format!(
                    "{filename} claims to be text but contains {found}"
                )));
            }
            UploadKind::PlainText
        }
        "docx" => {
            match sniffed {
                Some(DOCX_MEDIA_TYPE) | Some("application/zip") => {}
                other => {
                    return Err(unsupported(format!(
                        "{filename} is not a Word document (detected {})",
                        other.unwrap_or("unknown content")
                    )))
                }
            }
            UploadKind::WordProcessor
        }
        _ => {
            if sniffed != Some(media_type.as_str()) {
                return Err(unsupported(format!(
                    "{filename} content does not match its extension (expected {media_type}, detected {})",
                    sniffed.unwrap_or("unknown content")
                )));
            }
            if ext == "pdf" {
                UploadKind::Pdf
            } else {
                UploadKind::Image
            }
        }
    };

    Ok(ValidatedUpload { kind, media_type })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_media_types() {
        assert_eq!(media_type_for("a.PDF"), "application/pdf");
        assert_eq!(media_type_for("scan.jpg"), "image/jpeg");
        assert_eq!(media_type_for("scan.tif"), "image/tiff");
        assert_eq!(media_type_for("notes.md"), "text/markdown");
        assert_eq!(media_type_for("form.docx"), DOCX_MEDIA_TYPE);
        assert_eq!(media_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = validate_upload("virus.exe", b"MZ\x90\0", 1024).unwrap_err();
        assert!(err.to_string().contains("unsupported"));
        assert!(err.to_string().contains(".exe"));
    }

    #[test]
    fn test_size_ceiling() {
        let err = validate_upload("big.txt", &[b'a'; 32], 16).unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(validate_upload("empty.txt", b"", 16).is_err());
    }

    #[test]
    fn test_magic_bytes_must_match() {
        let ok = validate_upload("scan.png", PNG_MAGIC, 1024).unwrap();
        assert_eq!(ok.kind, UploadKind::Image);
        assert_eq!(ok.media_type, "image/png");

        let err = validate_upload("scan.pdf", PNG_MAGIC, 1024).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_text_that_is_binary_rejected() {
        assert!(validate_upload("notes.txt", PNG_MAGIC, 1024).is_err());
        let ok = validate_upload("notes.txt", "Consentimiento".as_bytes(), 1024).unwrap();
        assert_eq!(ok.kind, UploadKind::PlainText);
    }

    #[test]
    fn test_pdf_accepted() {
        let ok = validate_upload("consent.pdf", b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n", 1024).unwrap();
        assert_eq!(ok.kind, UploadKind::Pdf);
    }
}
