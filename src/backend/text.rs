//! Backends for text-like formats: plain text, delimited data, JSON and HTML.

use super::docx_text::unescape_xml;
use super::DocumentConverter;
use crate::core::ast::{BlockNode, DocumentAst, TableBlock};
use crate::{error::Error, ConvertOptions, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

fn read_lossy(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Plain text and Markdown: blank-line separated chunks become paragraphs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextBackend;

impl DocumentConverter for TextBackend {
    fn id(&self) -> &'static str {
        "text"
    }

    fn extract(&self, path: &Path, options: &ConvertOptions) -> Result<DocumentAst> {
        let text = read_lossy(path)?.replace("\r\n", "\n");
        let mut doc = DocumentAst::default();
        for chunk in text.split("\n\n") {
            let chunk = if options.preserve_whitespace {
                chunk.trim_matches('\n')
            } else {
                chunk.trim()
            };
            if !chunk.trim().is_empty() {
                doc.push(BlockNode::Paragraph(chunk.to_string()));
            }
        }
        Ok(doc)
    }
}

/// CSV / TSV files become a single Markdown table.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvBackend;

impl DocumentConverter for CsvBackend {
    fn id(&self) -> &'static str {
        "csv"
    }

    fn extract(&self, path: &Path, _options: &ConvertOptions) -> Result<DocumentAst> {
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => '\t',
            _ => ',',
        };
        let records = parse_delimited(&read_lossy(path)?, delimiter)?;
        let mut records = records.into_iter();
        let mut doc = DocumentAst::default();
        if let Some(header) = records.next() {
            doc.push(BlockNode::Table(TableBlock {
                header,
                rows: records.collect(),
            }));
        }
        Ok(doc)
    }
}

/// Splits delimited text into records, honouring double-quoted fields.
fn parse_delimited(text: &str, delimiter: char) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' if in_quotes => in_quotes = false,
            '"' if field.is_empty() => in_quotes = true,
            c if c == delimiter && !in_quotes => record.push(std::mem::take(&mut field)),
            '\r' if !in_quotes => {}
            '\n' if !in_quotes => {
                record.push(std::mem::take(&mut field));
                if record.iter().any(|f| !f.is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            c => field.push(c),
        }
    }

    if in_quotes {
        return Err(Error::Conversion("unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

/// JSON documents are validated and pretty-printed into a fenced block.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBackend;

impl DocumentConverter for JsonBackend {
    fn id(&self) -> &'static str {
        "json"
    }

    fn extract(&self, path: &Path, _options: &ConvertOptions) -> Result<DocumentAst> {
        let value: serde_json::Value = serde_json::from_str(&read_lossy(path)?)?;
        let mut doc = DocumentAst::default();
        doc.push(BlockNode::CodeBlock {
            language: "json".to_string(),
            text: serde_json::to_string_pretty(&value)?,
        });
        Ok(doc)
    }
}

/// HTML pages: headings, paragraphs, list items and preformatted blocks are
/// kept; all other markup is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HtmlBlock {
    Paragraph,
    Heading(usize),
    ListItem,
    Pre,
}

impl DocumentConverter for HtmlBackend {
    fn id(&self) -> &'static str {
        "html"
    }

    fn extract(&self, path: &Path, _options: &ConvertOptions) -> Result<DocumentAst> {
        Ok(html_to_ast(&read_lossy(path)?))
    }
}

fn noise_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<head\b.*?</head>|<!--.*?-->")
            .expect("noise regex is valid")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<(/?)([a-zA-Z][a-zA-Z0-9]*)[^>]*>").expect("tag regex is valid"))
}

fn html_to_ast(html: &str) -> DocumentAst {
    let html = noise_regex().replace_all(html, "");
    let mut doc = DocumentAst::default();
    let mut kind = HtmlBlock::Paragraph;
    let mut buffer = String::new();
    let mut last = 0;

    for tag in tag_regex().captures_iter(&html) {
        let Some(whole) = tag.get(0) else { continue };
        push_text(&mut buffer, &html[last..whole.start()], kind == HtmlBlock::Pre);
        last = whole.end();

        let closing = &tag[1] == "/";
        let name = tag[2].to_ascii_lowercase();
        match name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                flush(&mut doc, &mut buffer, kind);
                kind = if closing {
                    HtmlBlock::Paragraph
                } else {
                    HtmlBlock::Heading(usize::from(name.as_bytes()[1] - b'0'))
                };
            }
            "li" => {
                flush(&mut doc, &mut buffer, kind);
                kind = if closing { HtmlBlock::Paragraph } else { HtmlBlock::ListItem };
            }
            "pre" => {
                flush(&mut doc, &mut buffer, kind);
                kind = if closing { HtmlBlock::Paragraph } else { HtmlBlock::Pre };
            }
            "p" | "div" | "tr" | "ul" | "ol" | "table" | "blockquote" | "section" | "article" => {
                flush(&mut doc, &mut buffer, kind);
            }
            "br" => buffer.push_str("  \n"),
            "td" | "th" if !closing && !buffer.trim().is_empty() => buffer.push_str(" | "),
            _ => {}
        }
    }
    push_text(&mut buffer, &html[last..], kind == HtmlBlock::Pre);
    flush(&mut doc, &mut buffer, kind);
    doc
}

fn push_text(buffer: &mut String, raw: &str, preformatted: bool) {
    let text = unescape_xml(raw);
    if preformatted {
        buffer.push_str(&text);
        return;
    }
    let mut pending_space = text.starts_with(char::is_whitespace) && !buffer.is_empty();
    for word in text.split_whitespace() {
        if pending_space && !buffer.ends_with(&[' ', '\n'][..]) {
            buffer.push(' ');
        }
        buffer.push_str(word);
        pending_space = true;
    }
    if text.ends_with(char::is_whitespace) && !buffer.is_empty() && !buffer.ends_with(&[' ', '\n'][..]) {
        buffer.push(' ');
    }
}

fn flush(doc: &mut DocumentAst, buffer: &mut String, kind: HtmlBlock) {
    let text = std::mem::take(buffer);
    if text.trim().is_empty() {
        return;
    }
    let block = match kind {
        HtmlBlock::Paragraph => BlockNode::Paragraph(text.trim().to_string()),
        HtmlBlock::Heading(level) => BlockNode::Heading {
            level,
            text: text.trim().to_string(),
        },
        HtmlBlock::ListItem => BlockNode::ListItem(text.trim().to_string()),
        HtmlBlock::Pre => BlockNode::CodeBlock {
            language: String::new(),
            text: text.trim_matches('\n').to_string(),
        },
    };
    doc.push(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_delimited_quotes() {
        let records = parse_delimited("a,b\n\"x, y\",\"say \"\"hi\"\"\"\n\n3,\n", ',').unwrap();
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["x, y".to_string(), "say \"hi\"".to_string()],
                vec!["3".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn test_parse_delimited_without_trailing_newline() {
        let records = parse_delimited("a\tb\n1\t2", '\t').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_parse_delimited_unterminated_quote() {
        assert!(parse_delimited("\"open,1\n", ',').is_err());
    }

    #[test]
    fn test_html_blocks() {
        let doc = html_to_ast(
            "<html><head><title>x</title></head><body><h2>Intro</h2><p>Hello <b>big</b>\n world &amp; co</p><ul><li>one</li><li>two</li></ul><script>var a;</script><pre>a\n  b</pre></body></html>",
        );
        assert_eq!(
            doc.blocks,
            vec![
                BlockNode::Heading {
                    level: 2,
                    text: "Intro".to_string()
                },
                BlockNode::Paragraph("Hello big world & co".to_string()),
                BlockNode::ListItem("one".to_string()),
                BlockNode::ListItem("two".to_string()),
                BlockNode::CodeBlock {
                    language: String::new(),
                    text: "a\n  b".to_string()
                },
            ]
        );
    }
}
