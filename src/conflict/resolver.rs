//! Conflict resolver - decides what to do when an output path is taken.

use super::{
    ConflictPolicy, ConflictPrompt, ConflictStatus, FileConflictInfo, Resolution,
    ResolutionAction,
};
use crate::config::FileConflictConfig;
use crate::{error::Error, Result};
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_RENAME_PATTERN: &str = "{name}_{counter}{ext}";

/// Upper bound for the counter search before falling back to timestamps.
pub const MAX_RENAME_ATTEMPTS: u32 = 1000;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Resolves conflicts according to a [`FileConflictConfig`].
///
/// Holds the session's remembered choice, so one resolver should be used
/// for a whole batch.
pub struct ConflictResolver {
    config: FileConflictConfig,
    prompt: Option<Box<dyn ConflictPrompt>>,
    remembered: Option<ConflictPolicy>,
}

impl ConflictResolver {
    pub fn new(config: FileConflictConfig) -> Self {
        Self {
            config,
            prompt: None,
            remembered: None,
        }
    }

    /// Installs the prompt used for [`ConflictPolicy::Ask`].
    pub fn with_prompt(mut self, prompt: Box<dyn ConflictPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn config(&self) -> &FileConflictConfig {
        &self.config
    }

    /// The policy applied to the next conflict when the caller has no preference.
    pub fn effective_policy(&self) -> ConflictPolicy {
        self.remembered.unwrap_or(self.config.default_policy)
    }

    pub fn remembered_policy(&self) -> Option<ConflictPolicy> {
        self.remembered
    }

    pub fn forget_choices(&mut self) {
        self.remembered = None;
    }

    /// Stats `target` and describes the collision, if any.
    ///
    /// Stat failures other than "not found" are logged and treated as no conflict.
    pub fn detect_conflict(&self, source: &Path, target: &Path) -> FileConflictInfo {
        let mut info = FileConflictInfo::new(source.to_path_buf(), target.to_path_buf());
        match fs::metadata(target) {
            Ok(meta) => {
                info.status = ConflictStatus::Exists;
                info.existing_size = Some(meta.len());
                info.existing_modified = meta.modified().ok();
                info.suggested = Some(self.effective_policy());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    target = %target.display(),
                    "could not stat output path, assuming no conflict: {e}"
                );
            }
        }
        info
    }

    /// Applies `policy` to a detected conflict.
    ///
    /// On success the conflict is `Resolved` and the returned action is
    /// skip, overwrite or rename. `Ask` consults the prompt and substitutes
    /// the configured timeout policy when no answer arrives. An info without
    /// a conflict resolves to a plain write of its target path.
    pub fn resolve(
        &mut self,
        info: &mut FileConflictInfo,
        policy: ConflictPolicy,
    ) -> Result<Resolution> {
        if !info.has_conflict() {
            return Ok(Resolution {
                action: ResolutionAction::Overwrite,
                output_path: Some(info.target_path.clone()),
                backup_path: None,
            });
        }

        let policy = match policy {
            ConflictPolicy::Ask => self.ask(info),
            concrete => concrete,
        };

        let resolution = match policy {
            ConflictPolicy::Skip => {
                info.advance(ConflictStatus::WillSkip)?;
                Resolution::skip()
            }
            ConflictPolicy::Overwrite => {
                info.advance(ConflictStatus::WillOverwrite)?;
                let backup_path = if self.config.backup_original {
                    Some(backup_path_for(&info.target_path)?)
                } else {
                    None
                };
                Resolution {
                    action: ResolutionAction::Overwrite,
                    output_path: Some(info.target_path.clone()),
                    backup_path,
                }
            }
            ConflictPolicy::Rename | ConflictPolicy::Ask => {
                info.advance(ConflictStatus::WillRename)?;
                let renamed = generate_renamed_path(&info.target_path, &self.config.rename_pattern)?;
                Resolution {
                    action: ResolutionAction::Rename,
                    output_path: Some(renamed),
                    backup_path: None,
                }
            }
        };

        info.advance(ConflictStatus::Resolved)?;
        tracing::debug!(
            target = %info.target_path.display(),
            action = ?resolution.action,
            "conflict resolved"
        );
        Ok(resolution)
    }

    /// Copies the file about to be replaced to the resolution's backup path.
    pub fn backup_existing(&self, resolution: &Resolution) -> Result<Option<PathBuf>> {
        let (Some(existing), Some(backup)) = (&resolution.output_path, &resolution.backup_path)
        else {
            return Ok(None);
        };
        fs::copy(existing, backup)?;
        tracing::info!(backup = %backup.display(), "backed up existing output");
        Ok(Some(backup.clone()))
    }

    fn ask(&mut self, info: &FileConflictInfo) -> ConflictPolicy {
        if let Some(remembered) = self.remembered {
            return remembered;
        }

        let fallback = self.timeout_policy();
        let Some(prompt) = &self.prompt else {
            tracing::warn!("no conflict prompt installed, using {fallback}");
            return fallback;
        };

        match prompt.ask(info, self.config.ask_timeout) {
            Some(answer) if answer.policy != ConflictPolicy::Ask => {
                if answer.apply_to_all && self.config.remember_choice {
                    self.remembered = Some(answer.policy);
                }
                answer.policy
            }
            _ => {
                tracing::warn!(
                    target = %info.target_path.display(),
                    "conflict prompt gave no answer, using {fallback}"
                );
                fallback
            }
        }
    }

    fn timeout_policy(&self) -> ConflictPolicy {
        match self.config.timeout_policy {
            ConflictPolicy::Ask => ConflictPolicy::Skip,
            other => other,
        }
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("placeholder regex is valid"))
}

/// A pattern may only use `{name}`, `{counter}` and `{ext}`, must contain
/// `{counter}` and must stay within the target's directory.
pub fn is_valid_pattern(pattern: &str) -> bool {
    if !pattern.contains("{counter}") || pattern.contains('/') || pattern.contains('\\') {
        return false;
    }
    let known = placeholder_regex()
        .captures_iter(pattern)
        .all(|c| matches!(&c[1], "name" | "counter" | "ext"));
    let leftover = placeholder_regex().replace_all(pattern, "");
    known && !leftover.contains('{') && !leftover.contains('}')
}

fn format_pattern(pattern: &str, name: &str, counter: u32, ext: &str) -> String {
    placeholder_regex()
        .replace_all(pattern, |caps: &regex::Captures<'_>| match &caps[1] {
            "name" => name.to_string(),
            "counter" => counter.to_string(),
            "ext" => ext.to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

fn path_taken(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn split_name(target: &Path) -> (&Path, String, String) {
    let parent = target.parent().unwrap_or(Path::new(""));
    let name = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (parent, name, ext)
}

/// Finds a free sibling of `target` by filling in `pattern` with an
/// increasing counter.
///
/// Invalid patterns fall back to [`DEFAULT_RENAME_PATTERN`]. After
/// [`MAX_RENAME_ATTEMPTS`] taken names a timestamped name is tried, then
/// timestamped names with a counter.
pub fn generate_renamed_path(target: &Path, pattern: &str) -> Result<PathBuf> {
    let pattern = if is_valid_pattern(pattern) {
        pattern
    } else {
        tracing::warn!(pattern, "invalid rename pattern, using {DEFAULT_RENAME_PATTERN}");
        DEFAULT_RENAME_PATTERN
    };
    let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    find_free_name(target, pattern, MAX_RENAME_ATTEMPTS, &stamp)
}

fn find_free_name(target: &Path, pattern: &str, limit: u32, stamp: &str) -> Result<PathBuf> {
    let (parent, name, ext) = split_name(target);

    for counter in 1..=limit {
        let candidate = parent.join(format_pattern(pattern, &name, counter, &ext));
        if !path_taken(&candidate) {
            return Ok(candidate);
        }
    }

    tracing::warn!(target = %target.display(), "rename counter exhausted, using timestamp");
    let stamped = parent.join(format!("{name}_{stamp}{ext}"));
    if !path_taken(&stamped) {
        return Ok(stamped);
    }
    for n in 1..=limit {
        let candidate = parent.join(format!("{name}_{stamp}_{n}{ext}"));
        if !path_taken(&candidate) {
            return Ok(candidate);
        }
    }

    Err(Error::RenameExhausted(target.to_path_buf()))
}

/// Picks an unused backup name such as `report.backup_20260101_120000.md`.
pub fn backup_path_for(target: &Path) -> Result<PathBuf> {
    let (parent, name, ext) = split_name(target);
    let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    let candidate = parent.join(format!("{name}.backup_{stamp}{ext}"));
    if !path_taken(&candidate) {
        return Ok(candidate);
    }
    generate_renamed_path(&candidate, DEFAULT_RENAME_PATTERN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictAnswer, FixedPrompt};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config() -> FileConflictConfig {
        FileConflictConfig {
            ask_timeout: Duration::from_millis(10),
            ..Default::default()
        }
    }

    fn existing(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "old").unwrap();
        path
    }

    #[test]
    fn test_pattern_validation() {
        assert!(is_valid_pattern("{name}_{counter}{ext}"));
        assert!(is_valid_pattern("{name} ({counter}){ext}"));
        assert!(!is_valid_pattern("{name}{ext}"));
        assert!(!is_valid_pattern("{name}_{count}{ext}"));
        assert!(!is_valid_pattern("../{name}_{counter}{ext}"));
        assert!(!is_valid_pattern("{name}_{counter{ext}"));
    }

    #[test]
    fn test_pattern_placeholders_in_stem_are_literal() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "{counter}{ext}.md");

        let renamed = generate_renamed_path(&target, DEFAULT_RENAME_PATTERN).unwrap();
        assert_eq!(renamed, dir.path().join("{counter}{ext}_1.md"));
    }

    #[test]
    fn test_counter_exhaustion_falls_back_to_timestamp() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        for n in 1..=MAX_RENAME_ATTEMPTS {
            existing(&dir, &format!("report_{n}.md"));
        }

        let renamed = generate_renamed_path(&target, DEFAULT_RENAME_PATTERN).unwrap();
        let file_name = renamed.file_name().unwrap().to_string_lossy().to_string();
        let stamp = file_name
            .strip_prefix("report_")
            .and_then(|rest| rest.strip_suffix(".md"))
            .unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok(), "{file_name}");
        assert!(!renamed.exists());
    }

    #[test]
    fn test_taken_timestamp_gets_suffix_then_exhausts() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        existing(&dir, "report_1.md");
        existing(&dir, "report_2.md");
        existing(&dir, "report_20260101_000000.md");

        let stamp = "20260101_000000";
        let renamed = find_free_name(&target, DEFAULT_RENAME_PATTERN, 2, stamp).unwrap();
        assert_eq!(renamed, dir.path().join("report_20260101_000000_1.md"));

        existing(&dir, "report_20260101_000000_1.md");
        existing(&dir, "report_20260101_000000_2.md");
        let err = find_free_name(&target, DEFAULT_RENAME_PATTERN, 2, stamp).unwrap_err();
        assert!(matches!(err, Error::RenameExhausted(_)));
    }

    #[test]
    fn test_renamed_path_skips_taken_names() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        existing(&dir, "report_1.md");

        let renamed = generate_renamed_path(&target, DEFAULT_RENAME_PATTERN).unwrap();
        assert_eq!(renamed, dir.path().join("report_2.md"));
    }

    #[test]
    fn test_renamed_path_without_extension() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "README");
        let renamed = generate_renamed_path(&target, "{name} ({counter}){ext}").unwrap();
        assert_eq!(renamed, dir.path().join("README (1)"));
    }

    #[test]
    fn test_invalid_pattern_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        let renamed = generate_renamed_path(&target, "{nope}").unwrap();
        assert_eq!(renamed, dir.path().join("report_1.md"));
    }

    #[test]
    fn test_detect_conflict_records_metadata() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        let resolver = ConflictResolver::new(config());

        let info = resolver.detect_conflict(Path::new("report.docx"), &target);
        assert_eq!(info.status(), ConflictStatus::Exists);
        assert_eq!(info.existing_size, Some(3));
        assert!(info.existing_modified.is_some());
        assert_eq!(info.suggested, Some(ConflictPolicy::Rename));

        let free = resolver.detect_conflict(Path::new("x.docx"), &dir.path().join("x.md"));
        assert_eq!(free.status(), ConflictStatus::None);
        assert_eq!(free.existing_size, None);
    }

    #[test]
    fn test_overwrite_with_backup() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        let mut resolver = ConflictResolver::new(FileConflictConfig {
            backup_original: true,
            ..config()
        });

        let mut info = resolver.detect_conflict(Path::new("report.docx"), &target);
        let resolution = resolver.resolve(&mut info, ConflictPolicy::Overwrite).unwrap();
        assert_eq!(resolution.action, ResolutionAction::Overwrite);
        assert_eq!(resolution.output_path.as_deref(), Some(target.as_path()));

        let backup = resolver.backup_existing(&resolution).unwrap().unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "old");
        assert_eq!(info.status(), ConflictStatus::Resolved);
    }

    #[test]
    fn test_ask_without_answer_uses_timeout_policy() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        let mut resolver = ConflictResolver::new(FileConflictConfig {
            timeout_policy: ConflictPolicy::Skip,
            ..config()
        })
        .with_prompt(Box::new(FixedPrompt(None)));

        let mut info = resolver.detect_conflict(Path::new("report.docx"), &target);
        let resolution = resolver.resolve(&mut info, ConflictPolicy::Ask).unwrap();
        assert!(resolution.is_skip());
    }

    #[test]
    fn test_ask_apply_to_all_is_remembered() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        let mut resolver = ConflictResolver::new(config()).with_prompt(Box::new(FixedPrompt(
            Some(ConflictAnswer {
                policy: ConflictPolicy::Overwrite,
                apply_to_all: true,
            }),
        )));

        let mut info = resolver.detect_conflict(Path::new("report.docx"), &target);
        resolver.resolve(&mut info, ConflictPolicy::Ask).unwrap();
        assert_eq!(resolver.remembered_policy(), Some(ConflictPolicy::Overwrite));
        assert_eq!(resolver.effective_policy(), ConflictPolicy::Overwrite);

        resolver.forget_choices();
        assert_eq!(resolver.effective_policy(), ConflictPolicy::Rename);
    }

    #[test]
    fn test_resolving_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let target = existing(&dir, "report.md");
        let mut resolver = ConflictResolver::new(config());

        let mut info = resolver.detect_conflict(Path::new("report.docx"), &target);
        resolver.resolve(&mut info, ConflictPolicy::Skip).unwrap();
        assert!(matches!(
            resolver.resolve(&mut info, ConflictPolicy::Skip),
            Err(Error::InvalidTransition { .. })
        ));
    }
}
