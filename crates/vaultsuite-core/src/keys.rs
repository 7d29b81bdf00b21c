//! Unseal key shares.
//!
//! Shares are opaque: nothing here checks their cryptographic shape. They
//! are zeroed from memory on drop and never printed.

use std::fmt;
use std::path::Path;

use zeroize::Zeroizing;

use crate::error::{Result, SecretsError};

/// One fragment of a split root key, forwarded verbatim to the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyShare(Zeroizing<String>);

impl KeyShare {
    pub fn new(share: impl Into<String>) -> Self {
        Self(Zeroizing::new(share.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for KeyShare {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for KeyShare {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Trim entries and drop blanks and `#` comments, preserving order.
pub fn normalize_keys<I, S>(entries: I) -> Vec<KeyShare>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let trimmed = entry.as_ref().trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                None
            } else {
                Some(KeyShare::new(trimmed))
            }
        })
        .collect()
}

/// Extract key shares from newline-separated file contents.
pub fn parse_key_file(contents: &str) -> Vec<KeyShare> {
    normalize_keys(contents.lines())
}

/// Combine command-line shares with shares read from `file`.
///
/// Argument shares come first; duplicates keep their first position.
pub fn gather_keys<S: AsRef<str>>(args: &[S], file: Option<&Path>) -> Result<Vec<KeyShare>> {
    let mut keys = normalize_keys(args);

    if let Some(file) = file {
        if file.as_os_str().is_empty() {
            return Err(SecretsError::Input(
                "the provided key file path is invalid".into(),
            ));
        }
        let contents = Zeroizing::new(std::fs::read_to_string(file).map_err(|e| {
            SecretsError::Input(format!(
                "unable to read unseal keys from [{}]: {e}",
                file.display()
            ))
        })?);
        keys.extend(parse_key_file(&contents));
    }

    let mut unique: Vec<KeyShare> = Vec::with_capacity(keys.len());
    for key in keys {
        if !unique.contains(&key) {
            unique.push(key);
        }
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exposed(keys: &[KeyShare]) -> Vec<&str> {
        keys.iter().map(KeyShare::expose).collect()
    }

    #[test]
    fn key_file_skips_comments_and_blanks() {
        let keys = parse_key_file("key-1\n# comment\nkey-2\n");
        assert_eq!(exposed(&keys), vec!["key-1", "key-2"]);
    }

    #[test]
    fn key_file_trims_whitespace() {
        let keys = parse_key_file("  key-1  \r\n\n   # indented comment\n\tkey-2\n\n");
        assert_eq!(exposed(&keys), vec!["key-1", "key-2"]);
    }

    #[test]
    fn gather_merges_args_then_file_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.txt");
        std::fs::write(&path, "key-2\n# backup share\nkey-3\nkey-1\n").unwrap();

        let keys = gather_keys(&["key-1", " ", "key-2"], Some(path.as_path())).unwrap();
        assert_eq!(exposed(&keys), vec!["key-1", "key-2", "key-3"]);
    }

    #[test]
    fn gather_without_file() {
        let keys = gather_keys(&["a", "#b", "a"], None).unwrap();
        assert_eq!(exposed(&keys), vec!["a"]);
        assert!(gather_keys::<&str>(&[], None).unwrap().is_empty());
    }

    #[test]
    fn gather_rejects_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt");
        let err = gather_keys(&["a"], Some(missing.as_path())).unwrap_err();
        assert!(matches!(err, SecretsError::Input(_)));
        assert!(err.to_string().contains("unable to read unseal keys"));
    }

    #[test]
    fn key_share_is_redacted() {
        let key = KeyShare::new("super-secret-share");
        assert_eq!(format!("{key:?}"), "[REDACTED]");
        assert_eq!(format!("{key}"), "[REDACTED]");
        assert_eq!(key.expose(), "super-secret-share");
    }
}
