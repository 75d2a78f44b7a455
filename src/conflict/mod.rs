//! Output-file conflict detection and resolution.

mod prompt;
mod resolver;

use crate::{error::Error, Result};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

pub use self::prompt::{ChannelPrompt, ConflictAnswer, ConflictPrompt, ConflictRequest, FixedPrompt};
pub use self::resolver::{
    backup_path_for, generate_renamed_path, is_valid_pattern, ConflictResolver,
    DEFAULT_RENAME_PATTERN, MAX_RENAME_ATTEMPTS,
};

/// How to handle an output path that already exists.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Leave the existing file alone and do not write output.
    Skip,
    /// Replace the existing file, optionally after backing it up.
    Overwrite,
    /// Write to a fresh name derived from the rename pattern.
    #[default]
    Rename,
    /// Ask the user for every conflict.
    Ask,
}

impl ConflictPolicy {
    pub const ALL: [ConflictPolicy; 4] = [
        ConflictPolicy::Skip,
        ConflictPolicy::Overwrite,
        ConflictPolicy::Rename,
        ConflictPolicy::Ask,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Rename => "rename",
            ConflictPolicy::Ask => "ask",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ConflictPolicy::Skip),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "rename" => Ok(ConflictPolicy::Rename),
            "ask" | "ask_user" => Ok(ConflictPolicy::Ask),
            other => Err(Error::Settings(format!("unknown conflict policy '{other}'"))),
        }
    }
}

/// Lifecycle of a single conflict.
///
/// `None -> Exists -> {WillSkip | WillOverwrite | WillRename} -> Resolved`
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    None,
    Exists,
    WillSkip,
    WillOverwrite,
    WillRename,
    Resolved,
}

impl ConflictStatus {
    pub fn can_transition_to(self, next: ConflictStatus) -> bool {
        use ConflictStatus::*;
        matches!(
            (self, next),
            (None, Exists)
                | (Exists, WillSkip)
                | (Exists, WillOverwrite)
                | (Exists, WillRename)
                | (WillSkip, Resolved)
                | (WillOverwrite, Resolved)
                | (WillRename, Resolved)
        )
    }
}

/// A pending collision between a proposed output path and an existing file.
#[derive(Debug, Clone, Serialize)]
pub struct FileConflictInfo {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    status: ConflictStatus,
    pub existing_size: Option<u64>,
    pub existing_modified: Option<SystemTime>,
    pub suggested: Option<ConflictPolicy>,
}

impl FileConflictInfo {
    pub fn new(source_path: PathBuf, target_path: PathBuf) -> Self {
        Self {
            source_path,
            target_path,
            status: ConflictStatus::None,
            existing_size: None,
            existing_modified: None,
            suggested: None,
        }
    }

    pub fn status(&self) -> ConflictStatus {
        self.status
    }

    pub fn has_conflict(&self) -> bool {
        self.status != ConflictStatus::None
    }

    /// Moves the conflict to `next`, rejecting transitions outside the lifecycle.
    pub fn advance(&mut self, next: ConflictStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", next),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Whether the source file was modified after the file it would replace.
    pub fn source_is_newer(&self) -> Option<bool> {
        let existing = self.existing_modified?;
        let source = std::fs::metadata(&self.source_path).ok()?.modified().ok()?;
        Some(source > existing)
    }
}

/// What the resolver decided to do.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Skip,
    Overwrite,
    Rename,
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub action: ResolutionAction,
    /// Where output should be written; `None` when skipping.
    pub output_path: Option<PathBuf>,
    /// Where the existing file should be copied before it is replaced.
    pub backup_path: Option<PathBuf>,
}

impl Resolution {
    pub fn skip() -> Self {
        Self {
            action: ResolutionAction::Skip,
            output_path: None,
            backup_path: None,
        }
    }

    pub fn is_skip(&self) -> bool {
        self.action == ResolutionAction::Skip
    }
}
