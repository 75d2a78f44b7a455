//! Conversion backends.
//!
//! Each backend turns one file into a [`DocumentAst`]; the registry renders
//! it to Markdown. Backends are looked up by the id named in the file-type
//! metadata, so new formats plug in through [`BackendRegistry::register`].

mod breaker;
mod docx;
mod docx_text;
mod images;
mod text;

use crate::core::ast::DocumentAst;
use crate::render::{MarkdownRenderer, Renderer};
use crate::{error::Error, ConvertOptions, Result};
use std::collections::HashMap;
use std::path::Path;

pub use self::breaker::CircuitBreaker;
pub use self::docx::DocxBackend;
pub use self::docx_text::DocxTextBackend;
pub use self::images::ImageExtractor;
pub use self::text::{CsvBackend, HtmlBackend, JsonBackend, TextBackend};

/// Converts one file into the intermediate document tree.
pub trait DocumentConverter: Send + Sync {
    /// Stable id referenced from the file-type metadata.
    fn id(&self) -> &'static str;

    fn extract(&self, path: &Path, options: &ConvertOptions) -> Result<DocumentAst>;
}

/// Backends by id.
pub struct BackendRegistry {
    converters: HashMap<String, Box<dyn DocumentConverter>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// All backends shipped with the crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(DocxBackend));
        registry.register(Box::new(DocxTextBackend));
        registry.register(Box::new(TextBackend));
        registry.register(Box::new(CsvBackend));
        registry.register(Box::new(JsonBackend));
        registry.register(Box::new(HtmlBackend));
        registry
    }

    /// Adds a backend, replacing any previous one with the same id.
    pub fn register(&mut self, converter: Box<dyn DocumentConverter>) {
        self.converters.insert(converter.id().to_string(), converter);
    }

    pub fn get(&self, id: &str) -> Option<&dyn DocumentConverter> {
        self.converters.get(id).map(|c| c.as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.converters.contains_key(id)
    }

    /// Runs backend `id` on `path` and renders the result as Markdown.
    pub fn convert(&self, id: &str, path: &Path, options: &ConvertOptions) -> Result<String> {
        let converter = self
            .get(id)
            .ok_or_else(|| Error::BackendUnavailable(format!("{} (backend '{id}')", path.display())))?;
        let document = converter.extract(path, options)?;
        MarkdownRenderer.render(&document)
    }
}
