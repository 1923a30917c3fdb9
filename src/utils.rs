//! Small text and file helpers shared by handlers.

use std::io::Write;
use std::path::Path;

/// Truncates a string to at most `max_chars` characters (not bytes).
///
/// UTF-8 safe: never splits a multi-byte character.
///
/// # Examples
///
/// ```
/// use forge_hooks::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Single-line preview for log fields: whitespace runs collapse to one
/// space and long text ends in `...`.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", truncate_str(&flat, max_chars))
    }
}

/// Write `contents` to a temp file beside `path` and rename it into place,
/// so readers see the old file or the new one, never a partial write.
///
/// Blocking; call from `spawn_blocking` on async paths.
///
/// # Errors
///
/// Returns the I/O error from creating, writing or renaming the temp file.
pub fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
