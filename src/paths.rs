//! Path conventions
//!
//! Which files count as memory, as generated documents, or as operational
//! bookkeeping, plus lexical path resolution against a working directory.

use std::path::{Component, Path, PathBuf};

/// Memory files that are bookkeeping rather than knowledge; never gated,
/// stamped or pruned.
pub const OPERATIONAL_FILES: &[&str] = &[
    "index.md",
    "lifecycle.md",
    "quality_guidance.md",
    "sync_log.md",
];

/// Directory name that marks memory artifacts
pub const MEMORY_DIR: &str = "memory";
/// Directory name that marks generated documents
pub const CLAUDEDOCS_DIR: &str = "claudedocs";

fn has_component(path: &Path, name: &str) -> bool {
    path.components()
        .any(|c| matches!(c, Component::Normal(part) if part == name))
}

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "md")
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Markdown file under a `memory/` directory.
#[must_use]
pub fn is_memory_file(path: &Path) -> bool {
    is_markdown(path) && has_component(path, MEMORY_DIR)
}

/// Bookkeeping file by name.
#[must_use]
pub fn is_operational(path: &Path) -> bool {
    OPERATIONAL_FILES.contains(&file_name(path))
}

/// Memory file that carries knowledge (not bookkeeping).
#[must_use]
pub fn is_knowledge_memory(path: &Path) -> bool {
    is_memory_file(path) && !is_operational(path)
}

/// Generated document subject to quality scoring: markdown under
/// `claudedocs/`, outside `archive/`, and not the manifest itself.
#[must_use]
pub fn is_scored_document(path: &Path) -> bool {
    is_markdown(path)
        && has_component(path, CLAUDEDOCS_DIR)
        && !has_component(path, "archive")
        && file_name(path) != "manifest.md"
}

/// Whether `raw` starts from a home directory (`~`, `~user`, `$HOME` or
/// `${HOME}`). Such paths are never expanded.
#[must_use]
pub fn is_home_relative(raw: &str) -> bool {
    let raw = raw.trim_start();
    raw.starts_with('~')
        || ["$HOME", "${HOME}"].iter().any(|prefix| {
            raw.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
}

/// Resolve `raw` against `working_dir` and fold `.` and `..` lexically.
///
/// The filesystem is not consulted, so symlinks are not followed.
#[must_use]
pub fn resolve(working_dir: &Path, raw: &str) -> PathBuf {
    let joined = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        working_dir.join(raw)
    };
    normalize(&joined)
}

/// Fold `.` and `..` components without touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root.
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` is `root` or below it, compared lexically.
#[must_use]
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}
