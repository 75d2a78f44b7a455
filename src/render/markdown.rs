use super::escape_table_cell;
use crate::core::ast::{BlockNode, DocumentAst, TableBlock};
use crate::render::Renderer;
use crate::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, document: &DocumentAst) -> Result<String> {
        let mut out = String::new();
        let mut blocks = document.blocks.iter().peekable();

        while let Some(block) = blocks.next() {
            let rendered = match block {
                BlockNode::Heading { level, text } => {
                    format!("{} {}", "#".repeat((*level).clamp(1, 6)), text.trim())
                }
                BlockNode::Paragraph(text) | BlockNode::Image(text) => text.trim_end().to_string(),
                BlockNode::ListItem(text) => format!("- {}", text.trim()),
                BlockNode::Table(table) => render_table(table),
                BlockNode::CodeBlock { language, text } => {
                    format!("```{}\n{}\n```", language, text.trim_end_matches('\n'))
                }
            };
            if rendered.trim().is_empty() {
                continue;
            }
            out.push_str(&rendered);

            // Consecutive list items stay in one list.
            let tight = matches!(block, BlockNode::ListItem(_))
                && matches!(blocks.peek(), Some(BlockNode::ListItem(_)));
            out.push_str(if tight { "\n" } else { "\n\n" });
        }

        Ok(out)
    }
}

fn render_table(table: &TableBlock) -> String {
    let width = std::iter::once(table.header.len())
        .chain(table.rows.iter().map(Vec::len))
        .max()
        .unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let row_line = |cells: &[String]| {
        let mut line = String::from("|");
        for i in 0..width {
            let cell = cells.get(i).map(|c| escape_table_cell(c)).unwrap_or_default();
            line.push(' ');
            line.push_str(&cell);
            line.push_str(" |");
        }
        line
    };

    let mut lines = vec![row_line(&table.header)];
    lines.push(format!("|{}", " --- |".repeat(width)));
    for row in &table.rows {
        lines.push(row_line(row));
    }
    lines.join("\n")
}
