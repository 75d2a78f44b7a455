#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentAst {
    pub blocks: Vec<BlockNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockNode {
    Heading { level: usize, text: String },
    Paragraph(String),
    ListItem(String),
    Table(TableBlock),
    CodeBlock { language: String, text: String },
    Image(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableBlock {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DocumentAst {
    pub fn push(&mut self, block: BlockNode) {
        self.blocks.push(block);
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
