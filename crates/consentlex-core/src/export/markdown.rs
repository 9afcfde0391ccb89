//! Markdown transcript

use super::{attachment_line, turn_heading, ExportFormat, ExportRequest, ExportStrategy};
use crate::error::Result;

/// Render the conversation as a Markdown document.
pub fn render_markdown(request: &ExportRequest) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", request.title));
    out.push_str(&format!(
        "_Session {} - exported {}_\n",
        request.session_label,
        request.generated_at.format("%Y-%m-%d %H:%M")
    ));

    for turn in &request.turns {
        out.push_str(&format!("\n---\n\n## {}\n\n", turn_heading(turn)));
        if let Some(line) = attachment_line(turn) {
            out.push_str(&format!("> {}\n\n", line));
        }
        out.push_str(turn.content.trim());
        out.push('\n');
    }
    out
}

/// Markdown as-is; the only strategy for the Markdown format
pub struct MarkdownStrategy;

impl ExportStrategy for MarkdownStrategy {
    fn id(&self) -> &str {
        "markdown"
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Markdown
    }

    fn attempt(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        Ok(render_markdown(request).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::{request, sample_turns};
    use crate::session::{ConversationTurn, DocumentId};

    #[test]
    fn test_markdown_keeps_turn_order() {
        let md = render_markdown(&request(sample_turns()));
        assert!(md.starts_with("# ConsentLex report\n"));
        let user = md.find("## User").unwrap();
        let assistant = md.find("## ConsentLex").unwrap();
        assert!(user < assistant);
        assert!(md.contains("**Sí**, en general."));
    }

    #[test]
    fn test_attachments_are_listed() {
        let turns = vec![
            ConversationTurn::user("revisa").with_attachments(vec![DocumentId(1), DocumentId(3)]),
        ];
        let md = render_markdown(&request(turns));
        assert!(md.contains("> Documents: #1, #3"));
    }
}
