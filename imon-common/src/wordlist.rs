//! Label wordlist
//!
//! Loaded once at startup and shared read-only (`Arc<Wordlist>`) by every
//! request. A missing or empty wordlist is a fatal startup condition.

use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::{Error, Result};

/// Ordered, immutable pool of candidate labels
#[derive(Debug, Clone)]
pub struct Wordlist {
    labels: Vec<String>,
    index: HashSet<String>,
}

impl Wordlist {
    /// Build from an in-memory list (blank entries are dropped)
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if labels.is_empty() {
            return Err(Error::Config("Wordlist contains no labels".to_string()));
        }

        let index = labels.iter().cloned().collect();
        Ok(Self { labels, index })
    }

    /// Parse wordlist text: one label per line, `#` starts a comment line
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_labels(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    /// Read and parse a wordlist file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read wordlist {}: {}", path.display(), e))
        })?;
        let wordlist = Self::parse(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })?;
        info!(
            path = %path.display(),
            labels = wordlist.len(),
            "Wordlist loaded"
        );
        Ok(wordlist)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Never true: construction refuses an empty list
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains(label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let wl = Wordlist::parse("# animals\ncat\n\n  dog  \n#bird\nfish\n").unwrap();
        assert_eq!(wl.labels(), &["cat", "dog", "fish"]);
        assert!(wl.contains("dog"));
        assert!(!wl.contains("bird"));
    }

    #[test]
    fn test_empty_wordlist_is_config_error() {
        assert!(matches!(Wordlist::parse("\n# nothing\n   \n"), Err(Error::Config(_))));
        assert!(matches!(
            Wordlist::from_labels(Vec::<String>::new()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "apple\nbanana").unwrap();
        let wl = Wordlist::load(file.path()).unwrap();
        assert_eq!(wl.len(), 2);
        assert!(!wl.is_empty());
        assert_eq!(wl.get(1), Some("banana"));
        assert_eq!(wl.get(2), None);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Wordlist::load(&dir.path().join("missing.txt"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
