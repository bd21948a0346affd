//! Filesystem-safe names for course directories and downloaded files.

use url::Url;

/// Longest name, in characters, produced by [`sanitize_filename`].
const MAX_NAME_CHARS: usize = 120;

/// Longest accepted extension including the dot.
const MAX_EXTENSION_LEN: usize = 12;

/// Placeholder for names that sanitize to nothing.
const EMPTY_NAME: &str = "untitled";

/// Sanitizes a title for use as one path segment.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`, collapses runs of
/// whitespace, trims leading/trailing dots and spaces, and caps the length.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let collapsed = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_NAME_CHARS).collect();
    let trimmed = capped.trim_matches(|c: char| c == '.' || c == ' ');

    if trimmed.is_empty() {
        EMPTY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lowercased extension (with the dot) of the URL's last path segment,
/// percent-decoded. `None` when there is no plausible extension.
#[must_use]
pub fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last_segment = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last_segment).ok()?;
    let dot_index = decoded.rfind('.')?;
    let ext = &decoded[dot_index..];
    if ext.len() <= 1
        || ext.len() > MAX_EXTENSION_LEN
        || !ext[1..].chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// `NN - title` with a 1-based, zero-padded index.
#[must_use]
pub fn indexed_name(index: usize, title: &str) -> String {
    format!("{index:02} - {}", sanitize_filename(title))
}
