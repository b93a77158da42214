//! Credential (cookie file) selection.
//!
//! The pool is whatever sits in the cookie directory at call time. Nothing is
//! cached between calls, so dropping a new cookie file in (or deleting a
//! burnt one) takes effect on the very next request.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::IndexedRandom;

use crate::config::CredentialsConfig;

/// One cookie file of the pool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name for logs; never log cookie contents
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for CredentialFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Strategy deciding which credential of the current pool to present
pub trait SelectionPolicy: Send + Sync {
    /// Pick one of `candidates`; `None` only when the slice is empty
    fn select(&self, candidates: &[CredentialFile]) -> Option<CredentialFile>;

    /// Name of this policy (for logging)
    fn name(&self) -> &'static str;
}

/// Uniformly random choice, stateless
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelection;

impl SelectionPolicy for RandomSelection {
    fn select(&self, candidates: &[CredentialFile]) -> Option<CredentialFile> {
        candidates.choose(&mut rand::rng()).cloned()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Cycles through the pool in file-name order
#[derive(Debug, Default)]
pub struct RoundRobinSelection {
    next: AtomicUsize,
}

impl SelectionPolicy for RoundRobinSelection {
    fn select(&self, candidates: &[CredentialFile]) -> Option<CredentialFile> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(index).cloned()
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Scans the cookie directory and applies a [`SelectionPolicy`]
pub struct CredentialSelector {
    dir: PathBuf,
    extension: String,
    policy: Box<dyn SelectionPolicy>,
}

impl CredentialSelector {
    /// Random selection over `dir/*.<extension>`
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            policy: Box::new(RandomSelection),
        }
    }

    pub fn from_config(config: &CredentialsConfig) -> Self {
        Self::new(&config.dir, &config.extension)
    }

    pub fn with_policy(mut self, policy: impl SelectionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current pool, sorted by path. Creates the directory when missing.
    pub fn scan(&self) -> Vec<CredentialFile> {
        if let Err(e) = fs_err::create_dir_all(&self.dir) {
            tracing::warn!("Cannot create credential directory: {}", e);
            return Vec::new();
        }

        let entries = match fs_err::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot scan credential directory: {}", e);
                return Vec::new();
            }
        };

        let mut files: Vec<CredentialFile> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.has_extension(path))
            .map(CredentialFile::new)
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Choose a credential for the next extractor call
    pub fn pick(&self) -> Option<CredentialFile> {
        let pool = self.scan();
        let choice = self.policy.select(&pool);

        match &choice {
            Some(file) => tracing::debug!(
                "Selected credential {} ({} policy, pool of {})",
                file,
                self.policy.name(),
                pool.len()
            ),
            None => tracing::debug!("No credential files in {}", self.dir.display()),
        }

        choice
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

impl fmt::Debug for CredentialSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSelector")
            .field("dir", &self.dir)
            .field("extension", &self.extension)
            .field("policy", &self.policy.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn pool_with(names: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            fs_err::write(dir.path().join(name), "# Netscape HTTP Cookie File\n").unwrap();
        }
        dir
    }

    #[test]
    fn test_random_pick_is_roughly_uniform() {
        let dir = pool_with(&["a.txt", "b.txt", "c.txt", "notes.json"]);
        let selector = CredentialSelector::new(dir.path(), "txt");

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..3000 {
            let file = selector.pick().expect("pool is not empty");
            *counts.entry(file.name()).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        assert!(!counts.contains_key("notes.json"));
        for (name, count) in counts {
            assert!((800..=1200).contains(&count), "{} picked {} times", name, count);
        }
    }

    #[test]
    fn test_empty_directory_yields_none() {
        let dir = pool_with(&[]);
        let selector = CredentialSelector::new(dir.path(), "txt");
        assert_eq!(selector.pick(), None);
    }

    #[test]
    fn test_missing_directory_is_created() {
        let root = tempfile::tempdir().unwrap();
        let cookies = root.path().join("cookies");
        let selector = CredentialSelector::new(&cookies, ".txt");

        assert_eq!(selector.pick(), None);
        assert!(cookies.is_dir());
    }

    #[test]
    fn test_rescans_on_every_call() {
        let dir = pool_with(&[]);
        let selector = CredentialSelector::new(dir.path(), "txt");
        assert_eq!(selector.pick(), None);

        fs_err::write(dir.path().join("fresh.txt"), "cookie").unwrap();
        assert_eq!(selector.pick().map(|f| f.name()).as_deref(), Some("fresh.txt"));

        fs_err::remove_file(dir.path().join("fresh.txt")).unwrap();
        assert_eq!(selector.pick(), None);
    }

    #[test]
    fn test_round_robin_cycles_in_name_order() {
        let dir = pool_with(&["b.txt", "a.txt", "c.TXT"]);
        let selector =
            CredentialSelector::new(dir.path(), "txt").with_policy(RoundRobinSelection::default());

        let picked: Vec<String> = (0..4).filter_map(|_| selector.pick()).map(|f| f.name()).collect();
        assert_eq!(picked, vec!["a.txt", "b.txt", "c.TXT", "a.txt"]);
    }
}
