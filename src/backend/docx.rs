//! DOCX backend built on `rs_docx`.
//!
//! Covers the structure that survives well in Markdown: headings from
//! paragraph styles, list paragraphs, bold/italic/strike runs, hyperlinks,
//! tables and embedded images. Everything else degrades to plain text.

use super::images::ImageExtractor;
use super::DocumentConverter;
use crate::core::ast::{BlockNode, DocumentAst, TableBlock};
use crate::render::{
    escape_html_attr, escape_markdown_link_destination, escape_markdown_link_text,
};
use crate::{error::Error, ConvertOptions, Result};
use rs_docx::document::{
    BodyContent, BreakType, Hyperlink, Paragraph, ParagraphContent, Run, RunContent, Table,
    TableCellContent, TableRowContent,
};
use rs_docx::DocxFile;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct DocxBackend;

impl DocumentConverter for DocxBackend {
    fn id(&self) -> &'static str {
        "docx"
    }

    fn extract(&self, path: &Path, options: &ConvertOptions) -> Result<DocumentAst> {
        let docx_file =
            DocxFile::from_file(path).map_err(|e| Error::DocxParse(format!("{:?}", e)))?;
        let docx = docx_file
            .parse()
            .map_err(|e| Error::DocxParse(format!("{:?}", e)))?;

        let mut rels = HashMap::new();
        if let Some(doc_rels) = &docx.document_rels {
            for rel in &doc_rels.relationships {
                rels.insert(rel.id.to_string(), rel.target.to_string());
            }
        }

        let mut walker = BodyWalker {
            rels: &rels,
            images: ImageExtractor::new(path, &options.image_handling)?,
            options,
            output: DocumentAst::default(),
        };
        for content in &docx.document.body.content {
            walker.body_content(content)?;
        }
        Ok(walker.output)
    }
}

struct BodyWalker<'r> {
    rels: &'r HashMap<String, String>,
    images: ImageExtractor,
    options: &'r ConvertOptions,
    output: DocumentAst,
}

impl BodyWalker<'_> {
    fn body_content(&mut self, content: &BodyContent<'_>) -> Result<()> {
        match content {
            BodyContent::Paragraph(para) => {
                if let Some(block) = self.paragraph_block(para)? {
                    self.output.push(block);
                }
            }
            BodyContent::Table(table) => {
                let block = self.table_block(table)?;
                self.output.push(BlockNode::Table(block));
            }
            BodyContent::Sdt(sdt) => {
                if let Some(sdt_content) = &sdt.content {
                    for child in &sdt_content.content {
                        self.body_content(child)?;
                    }
                }
            }
            BodyContent::BookmarkStart(bookmark) => {
                if let Some(name) = &bookmark.name {
                    self.output.push(BlockNode::Paragraph(format!(
                        "<a id=\"{}\"></a>",
                        escape_html_attr(name)
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn paragraph_block(&mut self, para: &Paragraph<'_>) -> Result<Option<BlockNode>> {
        let text = self.paragraph_text(para)?;
        let text = if self.options.preserve_whitespace {
            text
        } else {
            text.trim().to_string()
        };
        if text.trim().is_empty() {
            return Ok(None);
        }

        let props = para.property.as_ref();
        let heading = props
            .and_then(|p| p.style_id.as_ref())
            .and_then(|s| parse_heading_style(s.value.as_ref()));
        if let Some(level) = heading {
            return Ok(Some(BlockNode::Heading { level, text }));
        }
        if props.map(|p| p.numbering.is_some()).unwrap_or(false) {
            return Ok(Some(BlockNode::ListItem(text)));
        }
        Ok(Some(BlockNode::Paragraph(text)))
    }

    fn paragraph_text(&mut self, para: &Paragraph<'_>) -> Result<String> {
        let mut text = String::new();
        for content in &para.content {
            match content {
                ParagraphContent::Run(run) => text.push_str(&self.run_text(run)?),
                ParagraphContent::Link(link) => text.push_str(&self.hyperlink(link)?),
                _ => {}
            }
        }
        Ok(text)
    }

    fn hyperlink(&mut self, link: &Hyperlink<'_>) -> Result<String> {
        let mut label = String::new();
        for run in &link.content {
            label.push_str(&self.run_text(run)?);
        }

        let url = if let Some(anchor) = &link.anchor {
            format!("#{}", anchor)
        } else if let Some(target) = link.id.as_ref().and_then(|id| self.rels.get(id.as_ref())) {
            target.clone()
        } else {
            return Ok(label);
        };

        if label.trim().is_empty() {
            return Ok(url);
        }
        Ok(format!(
            "[{}]({})",
            escape_markdown_link_text(&label),
            escape_markdown_link_destination(&url)
        ))
    }

    fn run_text(&mut self, run: &Run<'_>) -> Result<String> {
        let mut text = String::new();
        for content in &run.content {
            match content {
                RunContent::Text(t) => text.push_str(&t.text),
                RunContent::Tab(_) => text.push('\t'),
                RunContent::Break(br) => match br.ty {
                    Some(BreakType::Page) => text.push_str("\n\n---\n\n"),
                    _ => text.push_str("  \n"),
                },
                RunContent::CarriageReturn(_) => text.push_str("  \n"),
                RunContent::Drawing(drawing) => {
                    if let Some(image) = self.images.extract_from_drawing(drawing, self.rels)? {
                        text.push_str(&image);
                    }
                }
                RunContent::Pict(pict) => {
                    if let Some(image) = self.images.extract_from_pict(pict, self.rels)? {
                        text.push_str(&image);
                    }
                }
                _ => {}
            }
        }

        let Some(props) = &run.property else {
            return Ok(text);
        };
        let is_bold = props.bold.as_ref().map(|b| b.value.unwrap_or(true)).unwrap_or(false);
        let is_italic = props
            .italics
            .as_ref()
            .map(|i| i.value.unwrap_or(true))
            .unwrap_or(false);
        let is_strike = props.strike.as_ref().map(|s| s.value.unwrap_or(true)).unwrap_or(false);

        if is_strike {
            text = emphasize(&text, "~~");
        }
        match (is_bold, is_italic) {
            (true, true) => text = emphasize(&text, "***"),
            (true, false) => text = emphasize(&text, "**"),
            (false, true) => text = emphasize(&text, "*"),
            (false, false) => {}
        }
        Ok(text)
    }

    fn table_block(&mut self, table: &Table<'_>) -> Result<TableBlock> {
        let mut rows = Vec::new();
        for row in &table.rows {
            let mut cells = Vec::new();
            for cell in &row.cells {
                let TableRowContent::TableCell(cell) = cell else {
                    continue;
                };
                let mut parts = Vec::new();
                for item in &cell.content {
                    match item {
                        TableCellContent::Paragraph(para) => {
                            let text = self.paragraph_text(para)?;
                            if !text.trim().is_empty() {
                                parts.push(text.trim().to_string());
                            }
                        }
                        // Nested tables are flattened into the cell text.
                        TableCellContent::Table(nested) => {
                            let nested = self.table_block(nested)?;
                            for nested_row in std::iter::once(nested.header).chain(nested.rows) {
                                parts.push(nested_row.join(" / "));
                            }
                        }
                    }
                }
                cells.push(parts.join("\n"));
            }
            rows.push(cells);
        }

        let mut rows = rows.into_iter();
        Ok(TableBlock {
            header: rows.next().unwrap_or_default(),
            rows: rows.collect(),
        })
    }
}

/// Wraps the non-blank core of `text` in `marker`, keeping surrounding spaces
/// outside so the emphasis stays valid Markdown.
fn emphasize(text: &str, marker: &str) -> String {
    let core = text.trim();
    if core.is_empty() {
        return text.to_string();
    }
    let start = text.len() - text.trim_start().len();
    let end = start + core.len();
    format!("{}{marker}{core}{marker}{}", &text[..start], &text[end..])
}

/// Maps a paragraph style id to a heading level ("Heading2", "Title", "제목 1").
pub(crate) fn parse_heading_style(style: &str) -> Option<usize> {
    let style_lower = style.to_lowercase();
    if let Some(rest) = style_lower.strip_prefix("heading") {
        return rest.trim().parse().ok().filter(|level| (1..=6).contains(level));
    }
    if style_lower.starts_with("제목") {
        return style_lower
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect::<String>()
            .parse()
            .ok()
            .filter(|level| (1..=6).contains(level));
    }
    match style_lower.as_str() {
        "title" => Some(1),
        "subtitle" => Some(2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_heading_style() {
        assert_eq!(parse_heading_style("Heading1"), Some(1));
        assert_eq!(parse_heading_style("heading 3"), Some(3));
        assert_eq!(parse_heading_style("Heading9"), None);
        assert_eq!(parse_heading_style("Title"), Some(1));
        assert_eq!(parse_heading_style("제목 2"), Some(2));
        assert_eq!(parse_heading_style("BodyText"), None);
    }

    #[test]
    fn test_emphasize_keeps_outer_whitespace() {
        assert_eq!(emphasize(" bold ", "**"), " **bold** ");
        assert_eq!(emphasize("   ", "**"), "   ");
        assert_eq!(emphasize("x", "*"), "*x*");
    }
}
