//! Persistent settings (`settings.ini`) and file-type metadata.
//!
//! Settings are kept in a [`configparser::ini::Ini`] so keys this crate does
//! not know about (for example the `[ui]` section written by a desktop shell)
//! survive a load/save cycle untouched.

mod file_types;

use crate::conflict::{ConflictPolicy, DEFAULT_RENAME_PATTERN};
use crate::{error::Error, ImageHandling, Result};
use configparser::ini::Ini;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use self::file_types::{FileType, FileTypeRegistry};

pub const SETTINGS_FILENAME: &str = "settings.ini";

const GENERAL: &str = "general";
const CONVERSION: &str = "conversion";
const FILE_CONFLICT: &str = "file_conflict";
const LLM: &str = "llm";

/// `[general]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralSettings {
    /// Output root; `None` writes next to each source file.
    pub output_dir: Option<PathBuf>,
    pub recursive: bool,
    pub include_hidden: bool,
    /// User file-type metadata replacing the built-in table.
    pub file_types: Option<PathBuf>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            recursive: true,
            include_hidden: false,
            file_types: None,
        }
    }
}

/// `[conversion]`
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub image_handling: ImageHandling,
    /// Try the file type's fallback backend when the primary one fails.
    pub enable_fallback: bool,
    /// Failures after which a backend is switched off for `breaker_cooldown`.
    pub failure_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            image_handling: ImageHandling::Inline,
            enable_fallback: true,
            failure_threshold: 3,
            breaker_cooldown: Duration::from_secs(300),
        }
    }
}

/// `[file_conflict]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConflictConfig {
    pub default_policy: ConflictPolicy,
    pub rename_pattern: String,
    /// Honour "apply to all" answers for the rest of the session.
    pub remember_choice: bool,
    /// Copy the existing file aside before overwriting it.
    pub backup_original: bool,
    /// How long an ask-user prompt may block the worker.
    pub ask_timeout: Duration,
    /// Substituted when the prompt times out. Never `Ask`.
    pub timeout_policy: ConflictPolicy,
}

impl Default for FileConflictConfig {
    fn default() -> Self {
        Self {
            default_policy: ConflictPolicy::Rename,
            rename_pattern: DEFAULT_RENAME_PATTERN.to_string(),
            remember_choice: true,
            backup_original: false,
            ask_timeout: Duration::from_secs(60),
            timeout_policy: ConflictPolicy::Skip,
        }
    }
}

/// `[llm]` - stored for the desktop shell, no client lives in this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmSettings {
    pub enabled: bool,
    pub model: String,
    pub endpoint: String,
}

/// `#` and `;` only start a comment at the beginning of a line, so values
/// such as rename patterns and paths may contain them.
fn new_ini() -> Ini {
    let mut defaults = Ini::new().defaults();
    defaults.inline_comment_symbols = Some(Vec::new());
    Ini::new_from_defaults(defaults)
}

/// Typed view over `settings.ini`.
#[derive(Debug, Clone)]
pub struct Settings {
    data: Ini,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    pub fn new() -> Self {
        Self { data: new_ini() }
    }

    /// Loads settings from `path`. A missing file yields defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file missing, using defaults");
            return Ok(Self::new());
        }
        let mut data = new_ini();
        data.load(path)
            .map_err(|e| Error::Settings(format!("{}: {e}", path.display())))?;
        Ok(Self { data })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut data = new_ini();
        data.read(text.to_string()).map_err(Error::Settings)?;
        Ok(Self { data })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.data.write(path)?;
        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    pub fn to_ini_string(&self) -> String {
        self.data.writes()
    }

    pub fn general(&self) -> GeneralSettings {
        let defaults = GeneralSettings::default();
        GeneralSettings {
            output_dir: self.get_path(GENERAL, "output_dir"),
            recursive: self.get_bool(GENERAL, "recursive", defaults.recursive),
            include_hidden: self.get_bool(GENERAL, "include_hidden", defaults.include_hidden),
            file_types: self.get_path(GENERAL, "file_types"),
        }
    }

    pub fn set_general(&mut self, general: &GeneralSettings) {
        self.set_path(GENERAL, "output_dir", general.output_dir.as_deref());
        self.set_bool(GENERAL, "recursive", general.recursive);
        self.set_bool(GENERAL, "include_hidden", general.include_hidden);
        self.set_path(GENERAL, "file_types", general.file_types.as_deref());
    }

    pub fn conversion(&self) -> ConversionSettings {
        let defaults = ConversionSettings::default();
        let image_handling = match self.get(CONVERSION, "image_handling").as_deref() {
            Some("skip") => ImageHandling::Skip,
            Some("dir") => match self.get_path(CONVERSION, "images_dir") {
                Some(dir) => ImageHandling::SaveToDir(dir),
                None => {
                    tracing::warn!("image_handling = dir without images_dir, embedding inline");
                    ImageHandling::Inline
                }
            },
            _ => defaults.image_handling,
        };
        ConversionSettings {
            image_handling,
            enable_fallback: self.get_bool(CONVERSION, "enable_fallback", defaults.enable_fallback),
            failure_threshold: self
                .get_parsed(CONVERSION, "failure_threshold")
                .unwrap_or(defaults.failure_threshold)
                .max(1),
            breaker_cooldown: self
                .get_parsed(CONVERSION, "breaker_cooldown_secs")
                .map(Duration::from_secs)
                .unwrap_or(defaults.breaker_cooldown),
        }
    }

    pub fn set_conversion(&mut self, conversion: &ConversionSettings) {
        let (mode, dir) = match &conversion.image_handling {
            ImageHandling::Inline => ("inline", None),
            ImageHandling::Skip => ("skip", None),
            ImageHandling::SaveToDir(dir) => ("dir", Some(dir.as_path())),
        };
        self.set(CONVERSION, "image_handling", mode);
        self.set_path(CONVERSION, "images_dir", dir);
        self.set_bool(CONVERSION, "enable_fallback", conversion.enable_fallback);
        self.set(
            CONVERSION,
            "failure_threshold",
            &conversion.failure_threshold.to_string(),
        );
        self.set(
            CONVERSION,
            "breaker_cooldown_secs",
            &conversion.breaker_cooldown.as_secs().to_string(),
        );
    }

    pub fn file_conflict(&self) -> FileConflictConfig {
        let defaults = FileConflictConfig::default();
        let timeout_policy = self
            .get_policy("timeout_policy")
            .filter(|p| *p != ConflictPolicy::Ask)
            .unwrap_or(defaults.timeout_policy);
        FileConflictConfig {
            default_policy: self.get_policy("default_policy").unwrap_or(defaults.default_policy),
            rename_pattern: self
                .get(FILE_CONFLICT, "rename_pattern")
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.rename_pattern),
            remember_choice: self.get_bool(FILE_CONFLICT, "remember_choice", defaults.remember_choice),
            backup_original: self.get_bool(FILE_CONFLICT, "backup_original", defaults.backup_original),
            ask_timeout: self
                .get_parsed(FILE_CONFLICT, "ask_timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ask_timeout),
            timeout_policy,
        }
    }

    pub fn set_file_conflict(&mut self, config: &FileConflictConfig) {
        self.set(FILE_CONFLICT, "default_policy", config.default_policy.as_str());
        self.set(FILE_CONFLICT, "rename_pattern", &config.rename_pattern);
        self.set_bool(FILE_CONFLICT, "remember_choice", config.remember_choice);
        self.set_bool(FILE_CONFLICT, "backup_original", config.backup_original);
        self.set(
            FILE_CONFLICT,
            "ask_timeout_secs",
            &config.ask_timeout.as_secs().to_string(),
        );
        self.set(FILE_CONFLICT, "timeout_policy", config.timeout_policy.as_str());
    }

    pub fn llm(&self) -> LlmSettings {
        LlmSettings {
            enabled: self.get_bool(LLM, "enabled", false),
            model: self.get(LLM, "model").unwrap_or_default(),
            endpoint: self.get(LLM, "endpoint").unwrap_or_default(),
        }
    }

    pub fn set_llm(&mut self, llm: &LlmSettings) {
        self.set_bool(LLM, "enabled", llm.enabled);
        self.set(LLM, "model", &llm.model);
        self.set(LLM, "endpoint", &llm.endpoint);
    }

    /// Raw lookup for sections this crate does not model.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.data.get(section, key).map(|v| v.trim().to_string())
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.data.set(section, key, Some(value.to_string()));
    }

    fn get_bool(&self, section: &str, key: &str, default_value: bool) -> bool {
        self.get(section, key)
            .map_or(default_value, |v| parse_bool(&v, default_value))
    }

    fn set_bool(&mut self, section: &str, key: &str, value: bool) {
        self.set(section, key, if value { "true" } else { "false" });
    }

    fn get_parsed<T: std::str::FromStr>(&self, section: &str, key: &str) -> Option<T> {
        let raw = self.get(section, key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(section, key, value = %raw, "ignoring malformed setting");
                None
            }
        }
    }

    fn get_policy(&self, key: &str) -> Option<ConflictPolicy> {
        self.get_parsed(FILE_CONFLICT, key)
    }

    fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get(section, key)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn set_path(&mut self, section: &str, key: &str, value: Option<&Path>) {
        let value = value.map(|p| p.display().to_string()).unwrap_or_default();
        self.set(section, key, &value);
    }
}

fn parse_bool(value: &str, default_value: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default_value,
    }
}
