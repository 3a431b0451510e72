//! Object names and the entries a bucket listing is made of.

use chrono::{DateTime, Utc};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Longest object name most filesystems accept for a single path segment.
pub const MAX_OBJECT_NAME_LEN: usize = 255;
/// Extensions longer than this are not worth preserving when truncating.
const MAX_KEPT_EXTENSION_LEN: usize = 16;

const WINDOWS_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// A filesystem-safe, single-segment object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName(String);

impl ObjectName {
    /// Turn arbitrary client input into a safe path segment.
    ///
    /// - NFKD-normalized, then anything non-ASCII is dropped
    /// - path separators count as whitespace, whitespace runs become `_`
    /// - anything outside `[A-Za-z0-9._-]` is dropped
    /// - leading and trailing `.`/`_` are stripped
    /// - Windows device names get a `_` prefix
    /// - capped at [`MAX_OBJECT_NAME_LEN`] bytes, keeping a short extension
    ///
    /// Returns `None` when nothing usable is left.
    pub fn sanitize(raw: &str) -> Option<Self> {
        let spaced: String = raw
            .nfkd()
            .filter(char::is_ascii)
            .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
            .collect();
        let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
        let filtered: String = joined
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect();
        let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');
        if trimmed.is_empty() {
            return None;
        }

        let stem = trimmed.split('.').next().unwrap_or(trimmed);
        let name = if WINDOWS_DEVICE_NAMES
            .iter()
            .any(|device| device.eq_ignore_ascii_case(stem))
        {
            format!("_{trimmed}")
        } else {
            trimmed.to_string()
        };
        Some(Self(truncate_name(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Shorten an ASCII name to [`MAX_OBJECT_NAME_LEN`], keeping its extension
/// when it is short enough.
fn truncate_name(name: String) -> String {
    if name.len() <= MAX_OBJECT_NAME_LEN {
        return name;
    }
    let ext = name
        .rfind('.')
        .map(|idx| &name[idx..])
        .filter(|ext| ext.len() <= MAX_KEPT_EXTENSION_LEN)
        .unwrap_or("");
    let stem = &name[..MAX_OBJECT_NAME_LEN - ext.len()];
    let stem = stem.trim_end_matches(|c| c == '.' || c == '_');
    format!("{stem}{ext}")
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored object as seen by a bucket listing.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub name: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}
