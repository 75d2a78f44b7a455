//! Plain-text extraction straight from `word/document.xml`.
//!
//! Used when the structured DOCX backend fails: it reads only `<w:t>` runs,
//! so damaged styles, numbering or media do not matter.

use super::DocumentConverter;
use crate::core::ast::{BlockNode, DocumentAst};
use crate::{error::Error, ConvertOptions, Result};
use regex::Regex;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Default, Clone, Copy)]
pub struct DocxTextBackend;

impl DocumentConverter for DocxTextBackend {
    fn id(&self) -> &'static str {
        "docx-text"
    }

    fn extract(&self, path: &Path, _options: &ConvertOptions) -> Result<DocumentAst> {
        let xml = read_document_xml(File::open(path)?)?;
        Ok(paragraphs_from_xml(&xml))
    }
}

fn read_document_xml<R: Read + Seek>(reader: R) -> Result<String> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|_| Error::DocxParse("word/document.xml missing".to_string()))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:p[ >].*?</w:p>").expect("paragraph regex is valid"))
}

fn text_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br/>")
            .expect("text regex is valid")
    })
}

fn paragraphs_from_xml(xml: &str) -> DocumentAst {
    let mut doc = DocumentAst::default();
    for para in paragraph_regex().find_iter(xml) {
        let mut text = String::new();
        for piece in text_regex().captures_iter(para.as_str()) {
            match piece.get(1) {
                Some(t) => text.push_str(&unescape_xml(t.as_str())),
                None if piece[0].starts_with("<w:tab") => text.push('\t'),
                None => text.push_str("  \n"),
            }
        }
        if !text.trim().is_empty() {
            doc.push(BlockNode::Paragraph(text.trim().to_string()));
        }
    }
    doc
}

pub(crate) fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
