//! Supported file types, loaded from JSON metadata.

use crate::{error::Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const BUILTIN_FILE_TYPES: &str = include_str!("file_types.json");

/// One convertible file type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    /// Extension without the leading dot.
    pub extension: String,
    pub description: String,
    pub category: String,
    /// Id of the backend that converts this type.
    pub backend: String,
    /// Id of the backend tried when the primary one fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileTypesDocument {
    file_types: Vec<FileType>,
}

/// Extension lookup table.
#[derive(Debug, Clone, Default)]
pub struct FileTypeRegistry {
    types: Vec<FileType>,
    by_extension: HashMap<String, usize>,
}

impl FileTypeRegistry {
    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_json(BUILTIN_FILE_TYPES).unwrap_or_else(|e| {
            tracing::error!("built-in file type table is invalid: {e}");
            Self::default()
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let document: FileTypesDocument = serde_json::from_str(text)?;
        let mut registry = Self::default();
        for mut file_type in document.file_types {
            file_type.extension = normalize_extension(&file_type.extension);
            if file_type.extension.is_empty() || file_type.backend.trim().is_empty() {
                return Err(Error::FileTypes(format!(
                    "entry '{}' needs an extension and a backend",
                    file_type.description
                )));
            }
            registry.insert(file_type);
        }
        Ok(registry)
    }

    /// Adds or replaces the entry for `file_type.extension`.
    pub fn insert(&mut self, file_type: FileType) {
        let key = normalize_extension(&file_type.extension);
        match self.by_extension.get(&key) {
            Some(&idx) => self.types[idx] = file_type,
            None => {
                self.by_extension.insert(key, self.types.len());
                self.types.push(file_type);
            }
        }
    }

    pub fn get(&self, extension: &str) -> Option<&FileType> {
        self.by_extension
            .get(&normalize_extension(extension))
            .map(|&idx| &self.types[idx])
    }

    pub fn for_path(&self, path: &Path) -> Option<&FileType> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.get(e))
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&serde_json::json!({
            "file_types": self.types
        }))?)
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_parses() {
        let registry = FileTypeRegistry::builtin();
        assert!(!registry.is_empty());
        let docx = registry.get("DOCX").expect("docx is supported");
        assert_eq!(docx.backend, "docx");
        assert_eq!(docx.fallback.as_deref(), Some("docx-text"));
    }

    #[test]
    fn test_lookup_by_path() {
        let registry = FileTypeRegistry::builtin();
        assert!(registry.is_supported(Path::new("dir/Notes.TXT")));
        assert!(!registry.is_supported(Path::new("dir/photo.jpg")));
        assert!(!registry.is_supported(Path::new("dir/Makefile")));
    }

    #[test]
    fn test_rejects_entries_without_backend() {
        let err = FileTypeRegistry::from_json(
            r#"{"file_types":[{"extension":".rtf","description":"RTF","category":"document","backend":""}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::FileTypes(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let registry = FileTypeRegistry::builtin();
        let reparsed = FileTypeRegistry::from_json(&registry.to_json().unwrap()).unwrap();
        assert_eq!(reparsed.len(), registry.len());
    }
}
