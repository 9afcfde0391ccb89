//! Plain-text fallback rendering

use super::{attachment_line, turn_heading, ExportFormat, ExportRequest, ExportStrategy};
use crate::error::{ConsentLexError, Result};

/// Render the conversation as plain text.
pub fn render_plain(request: &ExportRequest) -> String {
    let rule = "=".repeat(72);
    let mut out = String::new();
    out.push_str(&request.title);
    out.push('\n');
    out.push_str(&format!(
        "Session {} - exported {}\n{}\n",
        request.session_label,
        request.generated_at.format("%Y-%m-%d %H:%M"),
        rule
    ));

    for turn in &request.turns {
        out.push_str(&format!("\n[{}]\n", turn_heading(turn)));
        if let Some(line) = attachment_line(turn) {
            out.push_str(&line);
            out.push('\n');
        }
        out.push_str(turn.content.trim());
        out.push('\n');
    }
    out
}

/// Last resort for every format. Only fails when there is nothing to render.
pub struct PlainTextStrategy;

impl ExportStrategy for PlainTextStrategy {
    fn id(&self) -> &str {
        "plain-text"
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::PlainText
    }

    fn attempt(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        if request.turns.is_empty() {
            return Err(ConsentLexError::ExportStrategy {
                strategy: self.id().to_string(),
                reason: "no turns to render".to_string(),
            });
        }
        Ok(render_plain(request).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::{request, sample_turns};

    #[test]
    fn test_plain_text_contains_every_turn() {
        let text = render_plain(&request(sample_turns()));
        assert!(text.starts_with("ConsentLex report\nSession abcd1234"));
        assert!(text.contains("[User ("));
        assert!(text.contains("[ConsentLex ("));
        assert!(text.contains("Describe riesgos <b>típicos</b>"));
    }

    #[test]
    fn test_plain_text_refuses_empty_input() {
        assert!(PlainTextStrategy.attempt(&request(vec![])).is_err());
    }
}
