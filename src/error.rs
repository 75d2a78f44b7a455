//! Error types for batchmd.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for batchmd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while scanning, converting or writing output.
#[derive(Error, Debug)]
pub enum Error {
    /// Error occurred while parsing DOCX file.
    #[error("Failed to parse DOCX file: {0}")]
    DocxParse(String),

    /// Error occurred during file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error occurred during conversion.
    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Media file not found in DOCX archive.
    #[error("Media not found: {0}")]
    MediaNotFound(String),

    /// The settings file could not be read or written.
    #[error("Settings error: {0}")]
    Settings(String),

    /// The file-type metadata is malformed.
    #[error("File type metadata error: {0}")]
    FileTypes(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A conflict was moved to a state it cannot reach from its current one.
    #[error("Invalid conflict status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Every candidate name for a renamed output was already taken.
    #[error("Could not find a free name for {}", .0.display())]
    RenameExhausted(PathBuf),

    /// No backend is registered (or enabled) for a file.
    #[error("No conversion backend available for {0}")]
    BackendUnavailable(String),

    /// The batch was cancelled before this file was processed.
    #[error("Conversion cancelled")]
    Cancelled,
}

/// Coarse buckets used to pick recovery hints for a failed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Font,
    FontDescriptor,
    Conversion,
    Io,
    Configuration,
}

impl Error {
    /// Classifies the error from its variant and, for backend failures, its message.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_) | Error::RenameExhausted(_) => ErrorCategory::Io,
            Error::Settings(_) | Error::FileTypes(_) | Error::Json(_) => {
                ErrorCategory::Configuration
            }
            other => classify_message(&other.to_string()),
        }
    }
}

fn classify_message(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("fontbbox") || lower.contains("font descriptor") || lower.contains("fontdescriptor") {
        ErrorCategory::FontDescriptor
    } else if lower.contains("font") || lower.contains("glyph") {
        ErrorCategory::Font
    } else {
        ErrorCategory::Conversion
    }
}

impl ErrorCategory {
    /// Free-text hints shown next to a failure.
    pub fn recovery_suggestions(self) -> &'static [&'static str] {
        match self {
            ErrorCategory::Font => &[
                "The document references fonts that could not be loaded.",
                "Re-save the document with embedded fonts, or export it to DOCX first.",
            ],
            ErrorCategory::FontDescriptor => &[
                "The document has a damaged font descriptor.",
                "Try the plain-text fallback, or re-export the file from its source application.",
            ],
            ErrorCategory::Conversion => &[
                "Check that the file opens in its native application.",
                "Enable the fallback conversion path in the [conversion] settings.",
            ],
            ErrorCategory::Io => &[
                "Check that the output directory exists and is writable.",
                "Close any program that may be holding the file open.",
            ],
            ErrorCategory::Configuration => &[
                "Review settings.ini and the file-type metadata for typos.",
                "Delete the settings file to fall back to defaults.",
            ],
        }
    }
}

/// A failure as presented to the user.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub message: String,
    pub suggestions: Vec<String>,
    /// Whether a fallback backend was tried before giving up.
    pub fallback_attempted: bool,
}

impl ErrorReport {
    pub fn new(error: &Error, fallback_attempted: bool) -> Self {
        let category = error.category();
        Self {
            category,
            message: error.to_string(),
            suggestions: category
                .recovery_suggestions()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_attempted,
        }
    }
}
