//! HTML transcripts

use super::{
    attachment_line, render_markdown, turn_heading, ExportFormat, ExportRequest, ExportStrategy,
};
use crate::error::Result;
use pulldown_cmark::{html, Event, Options, Parser};

const STYLE: &str = "body{font-family:Helvetica,Arial,sans-serif;max-width:48rem;margin:2rem auto;line-height:1.5;color:#222}\
h1{font-size:1.5rem}h2{font-size:1.1rem;margin-top:2rem;border-top:1px solid #ccc;padding-top:1rem}\
.meta{color:#666;font-size:.9rem}.docs{color:#555;font-style:italic}";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        STYLE,
        body
    )
}

/// Markdown rendered with pulldown-cmark; raw HTML in messages is shown as text.
pub struct PulldownHtmlStrategy;

impl ExportStrategy for PulldownHtmlStrategy {
    fn id(&self) -> &str {
        "html-pulldown"
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    fn attempt(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        let markdown = render_markdown(request);
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let parser = Parser::new_ext(&markdown, options).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });
        let mut body = String::with_capacity(markdown.len() * 2);
        html::push_html(&mut body, parser);

        Ok(document(&request.title, &body).into_bytes())
    }
}

/// Hand-built markup with every message escaped; no Markdown interpretation
pub struct EscapedHtmlStrategy;

impl ExportStrategy for EscapedHtmlStrategy {
    fn id(&self) -> &str {
        "html-escaped"
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Html
    }

    fn attempt(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        let mut body = format!(
            "<h1>{}</h1>\n<p class=\"meta\">Session {} - exported {}</p>\n",
            escape(&request.title),
            escape(&request.session_label),
            request.generated_at.format("%Y-%m-%d %H:%M")
        );

        for turn in &request.turns {
            body.push_str(&format!("<section>\n<h2>{}</h2>\n", escape(&turn_heading(turn))));
            if let Some(line) = attachment_line(turn) {
                body.push_str(&format!("<p class=\"docs\">{}</p>\n", escape(&line)));
            }
            for paragraph in turn.content.trim().split("\n\n") {
                let lines: Vec<String> = paragraph.lines().map(escape).collect();
                body.push_str(&format!("<p>{}</p>\n", lines.join("<br>\n")));
            }
            body.push_str("</section>\n");
        }

        Ok(document(&request.title, &body).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::{request, sample_turns};

    fn render(strategy: &dyn ExportStrategy) -> String {
        String::from_utf8(strategy.attempt(&request(sample_turns())).unwrap()).unwrap()
    }

    #[test]
    fn test_pulldown_renders_markdown() {
        let html = render(&PulldownHtmlStrategy);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<strong>Sí</strong>"));
        assert!(html.contains("<li>Identifica el procedimiento</li>"));
    }

    #[test]
    fn test_pulldown_escapes_raw_html() {
        let html = render(&PulldownHtmlStrategy);
        assert!(html.contains("&lt;b&gt;típicos&lt;/b&gt;"));
        assert!(!html.contains("<b>típicos</b>"));
    }

    #[test]
    fn test_escaped_html_keeps_text_verbatim() {
        let html = render(&EscapedHtmlStrategy);
        assert!(html.contains("**Sí**, en general."));
        assert!(html.contains("&lt;b&gt;típicos&lt;/b&gt;"));
        assert!(html.contains("<h1>ConsentLex report</h1>"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
    }
}
