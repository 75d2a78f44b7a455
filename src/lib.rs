//! # batchmd
//!
//! Batch conversion of document folders to Markdown.
//!
//! A scan finds the convertible files below a root, the manager converts
//! each one with the backend its file type names, and the conflict resolver
//! decides what happens when the Markdown target already exists.
//!
//! ## Example
//!
//! ```no_run
//! use batchmd::config::{FileTypeRegistry, Settings};
//! use batchmd::manager::{plan_jobs, ConversionManager};
//! use batchmd::scanner::{scan, ScanOptions};
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//!
//! let settings = Settings::load("settings.ini").unwrap();
//! let registry = FileTypeRegistry::builtin();
//! let root = Path::new("./docs");
//! let tree = scan(root, &ScanOptions::default(), &registry, &AtomicBool::new(false)).unwrap();
//!
//! let mut manager = ConversionManager::new(&settings, registry);
//! let summary = manager.run(plan_jobs(&tree.files(), Some(root), None));
//! println!("{} converted, {} failed", summary.converted, summary.failed);
//! ```

pub mod backend;
pub mod config;
pub mod conflict;
pub mod core;
pub mod error;
pub mod manager;
pub mod progress;
pub mod render;
pub mod scanner;

pub use conflict::{ConflictPolicy, ConflictResolver, FileConflictInfo};
pub use error::{Error, ErrorReport, Result};
pub use manager::{BatchSummary, ConversionJob, ConversionManager};
pub use progress::{ConversionProgress, ProgressHandle};

use std::path::PathBuf;

/// Options passed to every conversion backend.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// How to handle images in the document.
    pub image_handling: ImageHandling,
    /// Whether to preserve exact whitespace.
    pub preserve_whitespace: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            image_handling: ImageHandling::Inline,
            preserve_whitespace: false,
        }
    }
}

/// Specifies how images should be handled during conversion.
#[derive(Debug, Clone)]
pub enum ImageHandling {
    /// Save images to a directory and reference them by path.
    SaveToDir(PathBuf),
    /// Embed images as base64 data URIs.
    Inline,
    /// Skip images entirely.
    Skip,
}
