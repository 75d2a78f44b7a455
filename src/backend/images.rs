//! Image extractor - pulls embedded media out of a DOCX archive.

use crate::conflict::MAX_RENAME_ATTEMPTS;
use crate::render::escape_markdown_link_destination;
use crate::{error::Error, ImageHandling, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rs_docx::document::{Drawing, Pict};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek};
use std::path::{Path, PathBuf};

/// Turns image relationships into Markdown according to [`ImageHandling`].
pub struct ImageExtractor {
    mode: ImageMode,
    docx_path: PathBuf,
    counter: usize,
}

enum ImageMode {
    SaveToDir { dir: PathBuf, prefix: String },
    Inline,
    Skip,
}

impl ImageExtractor {
    pub fn new(docx_path: &Path, handling: &ImageHandling) -> Result<Self> {
        let mode = match handling {
            ImageHandling::SaveToDir(dir) => {
                fs::create_dir_all(dir)?;
                let prefix = docx_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "document".to_string());
                ImageMode::SaveToDir {
                    dir: dir.clone(),
                    prefix,
                }
            }
            ImageHandling::Inline => ImageMode::Inline,
            ImageHandling::Skip => ImageMode::Skip,
        };
        Ok(Self {
            mode,
            docx_path: docx_path.to_path_buf(),
            counter: 0,
        })
    }

    pub fn extract_from_drawing(
        &mut self,
        drawing: &Drawing,
        rels: &HashMap<String, String>,
    ) -> Result<Option<String>> {
        if matches!(self.mode, ImageMode::Skip) {
            return Ok(None);
        }
        let Some(target) = find_blip_id(drawing).and_then(|id| rels.get(&id)) else {
            return Ok(None);
        };
        self.process_image(target)
    }

    pub fn extract_from_pict(
        &mut self,
        pict: &Pict,
        rels: &HashMap<String, String>,
    ) -> Result<Option<String>> {
        if matches!(self.mode, ImageMode::Skip) {
            return Ok(None);
        }
        let Some(target) = find_pict_image_id(pict).and_then(|id| rels.get(&id)) else {
            return Ok(None);
        };
        self.process_image(target)
    }

    fn process_image(&mut self, image_path: &str) -> Result<Option<String>> {
        let data = read_media(File::open(&self.docx_path)?, image_path)?;
        self.counter += 1;

        let ext = Path::new(image_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_ascii_lowercase();

        match &self.mode {
            ImageMode::SaveToDir { dir, prefix } => {
                let output_path = free_image_path(dir, prefix, self.counter, &ext, &data)?;
                if !output_path.exists() {
                    fs::write(&output_path, &data)?;
                }
                Ok(Some(format!(
                    "![image {}]({})",
                    self.counter,
                    escape_markdown_link_destination(&output_path.display().to_string())
                )))
            }
            ImageMode::Inline => Ok(Some(format!(
                "![image {}](data:{};base64,{})",
                self.counter,
                mime_type(&ext),
                BASE64.encode(&data)
            ))),
            ImageMode::Skip => Ok(None),
        }
    }
}

/// `{prefix}_image_{n}.{ext}` in `dir`, or a suffixed variant when another
/// document already wrote different bytes under that name. A file holding
/// the same bytes is reused.
fn free_image_path(dir: &Path, prefix: &str, n: usize, ext: &str, data: &[u8]) -> Result<PathBuf> {
    let base = format!("{prefix}_image_{n}");
    let candidates = std::iter::once(base.clone())
        .chain((1..=MAX_RENAME_ATTEMPTS).map(|k| format!("{base}_{k}")));
    for stem in candidates {
        let candidate = dir.join(format!("{stem}.{ext}"));
        match fs::read(&candidate) {
            Ok(existing) if existing == data => return Ok(candidate),
            Ok(_) => continue,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(candidate),
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::RenameExhausted(dir.join(format!("{base}.{ext}"))))
}

fn find_blip_id(drawing: &Drawing) -> Option<String> {
    let inline_graphic = drawing.inline.as_ref().and_then(|i| i.graphic.as_ref());
    let anchor_graphic = drawing.anchor.as_ref().and_then(|a| a.graphic.as_ref());
    [inline_graphic, anchor_graphic]
        .into_iter()
        .flatten()
        .filter_map(|graphic| graphic.data.children.first())
        .map(|pic| pic.fill.blip.embed.to_string())
        .find(|embed| !embed.is_empty())
}

fn find_pict_image_id(pict: &Pict) -> Option<String> {
    let from_shape = pict
        .shape
        .as_ref()
        .and_then(|s| s.image_data.as_ref())
        .and_then(|d| d.id.as_ref());
    let from_rect = pict
        .rect
        .as_ref()
        .and_then(|r| r.image_data.as_ref())
        .and_then(|d| d.id.as_ref());
    from_shape.or(from_rect).map(|id| id.to_string())
}

fn mime_type(ext: &str) -> &'static str {
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Reads a media entry; relationship targets are relative to `word/`.
pub(crate) fn read_media<R: Read + Seek>(reader: R, image_path: &str) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let trimmed = image_path.trim_start_matches('/');
    let full_path = if trimmed.starts_with("word/") {
        trimmed.to_string()
    } else {
        format!("word/{}", trimmed)
    };

    for path in [full_path.as_str(), trimmed] {
        if let Ok(mut entry) = archive.by_name(path) {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            return Ok(data);
        }
    }

    Err(Error::MediaNotFound(image_path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    fn archive_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_read_media_resolves_relative_targets() {
        let bytes = archive_with(&[("word/media/image1.png", b"PNG")]);
        let data = read_media(Cursor::new(bytes), "media/image1.png").unwrap();
        assert_eq!(data, b"PNG");
    }

    #[test]
    fn test_read_media_missing_entry() {
        let bytes = archive_with(&[("word/document.xml", b"<w:document/>")]);
        let err = read_media(Cursor::new(bytes), "media/nope.png").unwrap_err();
        assert!(matches!(err, Error::MediaNotFound(_)));
    }

    #[test]
    fn test_same_named_documents_get_distinct_images() {
        let dir = tempfile::TempDir::new().unwrap();

        let first = free_image_path(dir.path(), "report", 1, "png", b"from a").unwrap();
        assert_eq!(first, dir.path().join("report_image_1.png"));
        fs::write(&first, b"from a").unwrap();

        let second = free_image_path(dir.path(), "report", 1, "png", b"from b").unwrap();
        assert_eq!(second, dir.path().join("report_image_1_1.png"));
        fs::write(&second, b"from b").unwrap();

        // Converting either document again reuses its own file.
        assert_eq!(free_image_path(dir.path(), "report", 1, "png", b"from a").unwrap(), first);
        assert_eq!(free_image_path(dir.path(), "report", 1, "png", b"from b").unwrap(), second);
        assert_eq!(fs::read(&first).unwrap(), b"from a");
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type("jpeg"), "image/jpeg");
        assert_eq!(mime_type("emf"), "application/octet-stream");
    }
}
