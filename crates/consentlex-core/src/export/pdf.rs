//! PDF transcripts: printpdf first, a hand-assembled lopdf document second

use super::{attachment_line, turn_heading, ExportFormat, ExportRequest, ExportStrategy};
use crate::error::{ConsentLexError, Result};
use std::io::BufWriter;

/// A line of the laid-out transcript
#[derive(Debug, Clone, PartialEq)]
enum Line {
    Title(String),
    Heading(String),
    Body(String),
    Gap,
}

/// Flatten the conversation into wrapped lines.
fn layout(request: &ExportRequest, max_chars: usize) -> Vec<Line> {
    let mut lines = vec![
        Line::Title(request.title.clone()),
        Line::Body(format!(
            "Session {} - exported {}",
            request.session_label,
            request.generated_at.format("%Y-%m-%d %H:%M")
        )),
        Line::Gap,
    ];

    for turn in &request.turns {
        lines.push(Line::Heading(turn_heading(turn)));
        if let Some(docs) = attachment_line(turn) {
            lines.push(Line::Body(docs));
        }
        for paragraph in turn.content.trim().lines() {
            if paragraph.trim().is_empty() {
                lines.push(Line::Gap);
                continue;
            }
            lines.extend(wrap_text(paragraph, max_chars).into_iter().map(Line::Body));
        }
        lines.push(Line::Gap);
    }
    lines
}

/// Greedy word wrap; words longer than `max_chars` are cut into line-sized pieces.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    let pieces = text.split_whitespace().flat_map(|word| {
        let chars: Vec<char> = word.chars().collect();
        chars
            .chunks(max_chars)
            .map(|piece| piece.iter().collect::<String>())
            .collect::<Vec<_>>()
    });

    for word in pieces {
        let width = current.chars().count() + word.chars().count() + 1;
        if width > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn strategy_error(strategy: &str, reason: impl std::fmt::Display) -> ConsentLexError {
    ConsentLexError::ExportStrategy {
        strategy: strategy.to_string(),
        reason: reason.to_string(),
    }
}

/// A4 pages drawn with printpdf's built-in Helvetica
pub struct PrintPdfStrategy {
    pub wrap_at: usize,
}

impl Default for PrintPdfStrategy {
    fn default() -> Self {
        Self { wrap_at: 90 }
    }
}

impl ExportStrategy for PrintPdfStrategy {
    fn id(&self) -> &str {
        "pdf-printpdf"
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn attempt(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        use printpdf::{BuiltinFont, Mm, PdfDocument};

        const TOP: f32 = 280.0;
        const BOTTOM: f32 = 20.0;

        let (doc, page1, layer1) =
            PdfDocument::new(&request.title, Mm(210.0), Mm(297.0), "Layer 1");
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| strategy_error(self.id(), format!("font error: {e}")))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| strategy_error(self.id(), format!("font error: {e}")))?;

        let mut layer = doc.get_page(page1).get_layer(layer1);
        let mut y = TOP;
        let mut pages = 1;

        for line in layout(request, self.wrap_at) {
            let (text, size, step, is_bold) = match line {
                Line::Title(t) => (t, 14.0, 10.0, true),
                Line::Heading(t) => (t, 11.0, 6.0, true),
                Line::Body(t) => (t, 9.0, 4.5, false),
                Line::Gap => {
                    y -= 3.0;
                    continue;
                }
            };
            if y - step < BOTTOM {
                let (page, layer_index) =
                    doc.add_page(Mm(210.0), Mm(297.0), format!("Page {}", pages + 1));
                layer = doc.get_page(page).get_layer(layer_index);
                y = TOP;
                pages += 1;
            }
            layer.use_text(text, size, Mm(20.0), Mm(y), if is_bold { &bold } else { &font });
            y -= step;
        }

        let mut buf = BufWriter::new(Vec::new());
        doc.save(&mut buf)
            .map_err(|e| strategy_error(self.id(), format!("save error: {e}")))?;
        let bytes = buf
            .into_inner()
            .map_err(|e| strategy_error(self.id(), format!("buffer error: {e}")))?;
        tracing::debug!(pages, bytes = bytes.len(), "printpdf export rendered");
        Ok(bytes)
    }
}

/// Minimal PDF assembled object by object with lopdf
pub struct LopdfStrategy {
    pub wrap_at: usize,
    pub lines_per_page: usize,
}

impl Default for LopdfStrategy {
    fn default() -> Self {
        Self {
            wrap_at: 95,
            lines_per_page: 56,
        }
    }
}

/// WinAnsi-compatible bytes; characters outside Latin-1 become `?`.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

impl ExportStrategy for LopdfStrategy {
    fn id(&self) -> &str {
        "pdf-lopdf"
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn attempt(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream, StringFormat};

        let lines = layout(request, self.wrap_at);
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => regular_id, "F2" => bold_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for page_lines in lines.chunks(self.lines_per_page.max(1)) {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("TL", vec![13.into()]),
                Operation::new("Td", vec![50.into(), 800.into()]),
            ];
            for line in page_lines {
                let (font, size, text) = match line {
                    Line::Title(t) => ("F2", 14, t.as_str()),
                    Line::Heading(t) => ("F2", 11, t.as_str()),
                    Line::Body(t) => ("F1", 10, t.as_str()),
                    Line::Gap => ("F1", 10, ""),
                };
                operations.push(Operation::new("Tf", vec![font.into(), size.into()]));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::String(latin1(text), StringFormat::Literal)],
                ));
                operations.push(Operation::new("T*", vec![]));
            }
            operations.push(Operation::new("ET", vec![]));

            let content = Content { operations }
                .encode()
                .map_err(|e| strategy_error(self.id(), format!("content encoding: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| strategy_error(self.id(), format!("save error: {e}")))?;
        tracing::debug!(pages = count, bytes = bytes.len(), "lopdf export rendered");
        Ok(bytes)
    }
}
