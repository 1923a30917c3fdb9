//! Output archival
//!
//! When the agent stops, copies generated documents changed in the last few
//! minutes from `claudedocs/` into a dated archive and records each copy in
//! the archive manifest.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{read_if_exists, write_text};
use crate::hooks::{Event, Hook, HookContext, HookError, HookResult};
use crate::paths::{self, CLAUDEDOCS_DIR};

/// Directory under `claudedocs/` holding archived copies
pub const ARCHIVE_DIR: &str = "archive";
/// Manifest file inside the archive directory
pub const MANIFEST_FILE: &str = "manifest.md";

const MANIFEST_HEADER: &str =
    "# Archive Manifest\n\n| Archived | Source | Copy |\n|---|---|---|\n";

/// How far back a document change counts as part of this turn
const RECENT_WINDOW_MINUTES: i64 = 10;

/// Archives fresh `claudedocs/` output
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputArchival;

/// Top-level documents of `claudedocs` modified at or after `since`, sorted.
async fn recent_documents(claudedocs: &Path, since: DateTime<Utc>) -> Result<Vec<PathBuf>, HookError> {
    let mut entries = match tokio::fs::read_dir(claudedocs).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(HookError::io(claudedocs, err)),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| HookError::io(claudedocs, err))?
    {
        let path = entry.path();
        if !paths::is_scored_document(&path) {
            continue;
        }
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping document without mtime");
                continue;
            }
        };
        if modified >= since {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Copy one document into `archive/<date>/`; `None` when an identical copy
/// is already there.
async fn archive_one(source: &Path, archive_day: &Path) -> Result<Option<PathBuf>, HookError> {
    let Some(text) = read_if_exists(source).await? else {
        return Ok(None);
    };
    let Some(name) = source.file_name() else {
        return Ok(None);
    };
    let copy = archive_day.join(name);
    if read_if_exists(&copy).await?.as_deref() == Some(text.as_str()) {
        return Ok(None);
    }
    write_text(&copy, &text).await?;
    Ok(Some(copy))
}

/// Manifest text with one row appended per archived copy.
#[must_use]
pub fn append_manifest_rows(manifest: Option<&str>, rows: &[(String, String)], at: DateTime<Utc>) -> String {
    let mut text = manifest
        .filter(|m| !m.trim().is_empty())
        .map_or_else(|| MANIFEST_HEADER.to_string(), str::to_string);
    if !text.ends_with('\n') {
        text.push('\n');
    }
    let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
    for (source, copy) in rows {
        text.push_str(&format!("| {stamp} | {source} | {copy} |\n"));
    }
    text
}

#[async_trait]
impl Hook for OutputArchival {
    fn name(&self) -> &'static str {
        "output_archival"
    }

    async fn handle(&self, event: &Event, context: &HookContext) -> Result<HookResult, HookError> {
        let claudedocs = event.working_dir.join(CLAUDEDOCS_DIR);
        let since = context.now - Duration::minutes(RECENT_WINDOW_MINUTES);
        let documents = recent_documents(&claudedocs, since).await?;
        if documents.is_empty() {
            return Ok(HookResult::Continue);
        }

        let archive = claudedocs.join(ARCHIVE_DIR);
        let day = context.today().format("%Y-%m-%d").to_string();
        let archive_day = archive.join(&day);
        tokio::fs::create_dir_all(&archive_day)
            .await
            .map_err(|err| HookError::io(&archive_day, err))?;

        let mut rows = Vec::new();
        for document in &documents {
            let Some(copy) = archive_one(document, &archive_day).await? else {
                continue;
            };
            let source = document
                .strip_prefix(&event.working_dir)
                .unwrap_or(document)
                .display()
                .to_string();
            let copy = copy
                .strip_prefix(&archive)
                .unwrap_or(&copy)
                .display()
                .to_string();
            rows.push((source, copy));
        }
        if rows.is_empty() {
            return Ok(HookResult::Continue);
        }

        let manifest_path = archive.join(MANIFEST_FILE);
        let manifest = read_if_exists(&manifest_path).await?;
        let updated = append_manifest_rows(manifest.as_deref(), &rows, context.now);
        write_text(&manifest_path, &updated).await?;

        let names: Vec<&str> = rows.iter().map(|(source, _)| source.as_str()).collect();
        info!(count = rows.len(), day = %day, "Archived output documents");
        Ok(HookResult::InjectContext(format!(
            "Archived {} output file(s) to {CLAUDEDOCS_DIR}/{ARCHIVE_DIR}/{day}: {}",
            rows.len(),
            names.join(", ")
        )))
    }
}
