//! Directory scanning for convertible files.

use crate::config::FileTypeRegistry;
use crate::{error::Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use walkdir::{DirEntry, WalkDir};

/// What to include in a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    pub include_hidden: bool,
    /// Depth limit below the root when recursive; `None` for unlimited.
    pub max_depth: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            include_hidden: false,
            max_depth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Directory,
    File { size: u64, backend: String },
}

/// A directory or convertible file in the scan result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub path: PathBuf,
    pub kind: NodeKind,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn directory(path: &Path) -> Self {
        Self {
            name: display_name(path),
            path: path.to_path_buf(),
            kind: NodeKind::Directory,
            children: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    fn file_count(&self) -> usize {
        match self.kind {
            NodeKind::Directory => self.children.iter().map(TreeNode::file_count).sum(),
            NodeKind::File { .. } => 1,
        }
    }

    /// Child directory `name`, created if missing.
    fn child_dir(&mut self, name: &str) -> &mut TreeNode {
        let idx = match self.children.iter().position(|c| c.is_dir() && c.name == name) {
            Some(idx) => idx,
            None => {
                let path = self.path.join(name);
                self.children.push(TreeNode::directory(&path));
                self.children.len() - 1
            }
        };
        &mut self.children[idx]
    }

    fn prune_and_sort(&mut self) {
        for child in &mut self.children {
            child.prune_and_sort();
        }
        self.children.retain(|c| !c.is_dir() || !c.children.is_empty());
        self.children.sort_by(|a, b| {
            b.is_dir()
                .cmp(&a.is_dir())
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
    }
}

/// Result of a scan: the tree plus a count of entries that could not be read.
#[derive(Debug, Clone, Serialize)]
pub struct FileTree {
    pub root: TreeNode,
    pub unreadable: usize,
}

impl FileTree {
    /// Convertible files in display order.
    pub fn files(&self) -> Vec<PathBuf> {
        fn collect(node: &TreeNode, out: &mut Vec<PathBuf>) {
            match node.kind {
                NodeKind::Directory => node.children.iter().for_each(|c| collect(c, out)),
                NodeKind::File { .. } => out.push(node.path.clone()),
            }
        }
        let mut out = Vec::new();
        collect(&self.root, &mut out);
        out
    }

    pub fn file_count(&self) -> usize {
        self.root.file_count()
    }

    /// ASCII drawing of the tree.
    pub fn render(&self) -> String {
        fn walk(node: &TreeNode, prefix: &str, out: &mut String) {
            let count = node.children.len();
            for (i, child) in node.children.iter().enumerate() {
                let last = i + 1 == count;
                out.push_str(prefix);
                out.push_str(if last { "└── " } else { "├── " });
                out.push_str(&child.name);
                if child.is_dir() {
                    out.push('/');
                }
                out.push('\n');
                if child.is_dir() {
                    let next = format!("{}{}", prefix, if last { "    " } else { "│   " });
                    walk(child, &next, out);
                }
            }
        }
        let mut out = format!("{}\n", self.root.name);
        walk(&self.root, "", &mut out);
        out
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Walks `root` and builds a tree of the files `registry` knows how to convert.
///
/// `cancel` is checked before each entry; a set flag aborts with
/// [`Error::Cancelled`].
pub fn scan(
    root: &Path,
    options: &ScanOptions,
    registry: &FileTypeRegistry,
    cancel: &AtomicBool,
) -> Result<FileTree> {
    let meta = std::fs::metadata(root)?;
    let mut tree_root = TreeNode::directory(root);

    if meta.is_file() {
        let backend = registry
            .for_path(root)
            .map(|t| t.backend.clone())
            .ok_or_else(|| Error::BackendUnavailable(root.display().to_string()))?;
        tree_root.kind = NodeKind::File {
            size: meta.len(),
            backend,
        };
        return Ok(FileTree {
            root: tree_root,
            unreadable: 0,
        });
    }

    let max_depth = if options.recursive {
        options.max_depth.unwrap_or(usize::MAX)
    } else {
        1
    };
    let include_hidden = options.include_hidden;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| include_hidden || !is_hidden(e));

    let mut unreadable = 0;
    for entry in walker {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                unreadable += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_type) = registry.for_path(entry.path()) else {
            continue;
        };
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let mut node = &mut tree_root;
        if let Some(parent) = relative.parent() {
            for component in parent.components() {
                node = node.child_dir(&component.as_os_str().to_string_lossy());
            }
        }
        node.children.push(TreeNode {
            name: display_name(entry.path()),
            path: entry.path().to_path_buf(),
            kind: NodeKind::File {
                size,
                backend: file_type.backend.clone(),
            },
            children: Vec::new(),
        });
    }

    tree_root.prune_and_sort();
    tracing::info!(
        root = %root.display(),
        files = tree_root.file_count(),
        unreadable,
        "scan finished"
    );
    Ok(FileTree {
        root: tree_root,
        unreadable,
    })
}
