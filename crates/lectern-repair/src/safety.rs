//! Safety checks consulted before any file is touched.

use std::path::{Path, PathBuf};

use lectern_config::RepairSettings;
use tracing::debug;

/// Verdict of a safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    /// The replacement may proceed.
    Allow,
    /// The replacement must not proceed.
    Deny {
        /// Why the replacement was denied.
        reason: String,
    },
}

/// External veto over replacements.
pub trait SafetyGate: Send + Sync {
    /// Decide whether `replacement` may be installed over `original`.
    fn check(&self, original: &Path, replacement: &Path, title: &str) -> SafetyVerdict;
}

/// Configuration-driven gate: a global switch plus library roots.
#[derive(Debug, Clone)]
pub struct PolicySafetyGate {
    allow_replacements: bool,
    library_roots: Vec<PathBuf>,
}

impl PolicySafetyGate {
    /// Build a gate. An empty root list permits any location.
    #[must_use]
    pub const fn new(allow_replacements: bool, library_roots: Vec<PathBuf>) -> Self {
        Self {
            allow_replacements,
            library_roots,
        }
    }

    /// Build a gate from repair settings.
    #[must_use]
    pub fn from_settings(settings: &RepairSettings) -> Self {
        Self::new(settings.allow_replacements, settings.library_roots.clone())
    }

    fn inside_library(&self, original: &Path) -> bool {
        if self.library_roots.is_empty() {
            return true;
        }
        let original = original
            .canonicalize()
            .unwrap_or_else(|_| original.to_path_buf());
        self.library_roots.iter().any(|root| {
            let root = root.canonicalize().unwrap_or_else(|_| root.clone());
            original.starts_with(root)
        })
    }
}

impl SafetyGate for PolicySafetyGate {
    fn check(&self, original: &Path, _replacement: &Path, title: &str) -> SafetyVerdict {
        if !self.allow_replacements {
            return SafetyVerdict::Deny {
                reason: "replacements are disabled".to_string(),
            };
        }
        if !self.inside_library(original) {
            debug!(
                original = %original.display(),
                title = %title,
                "original outside library roots"
            );
            return SafetyVerdict::Deny {
                reason: format!("{} is outside the configured library roots", original.display()),
            };
        }
        SafetyVerdict::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn disabled_replacements_are_denied() {
        let gate = PolicySafetyGate::new(false, Vec::new());
        assert!(matches!(
            gate.check(Path::new("/a.mp3"), Path::new("/b.mp3"), "Book"),
            SafetyVerdict::Deny { .. }
        ));
    }

    #[test]
    fn empty_roots_permit_any_location() {
        let gate = PolicySafetyGate::new(true, Vec::new());
        assert_eq!(
            gate.check(Path::new("/anywhere/a.mp3"), Path::new("/b.mp3"), "Book"),
            SafetyVerdict::Allow
        );
    }

    #[test]
    fn roots_restrict_originals() -> anyhow::Result<()> {
        let library = tempfile::tempdir()?;
        let elsewhere = tempfile::tempdir()?;
        let inside = library.path().join("author").join("book.mp3");
        fs::create_dir_all(library.path().join("author"))?;
        fs::write(&inside, b"a")?;
        let outside = elsewhere.path().join("book.mp3");
        fs::write(&outside, b"a")?;

        let gate = PolicySafetyGate::new(true, vec![library.path().to_path_buf()]);
        assert_eq!(gate.check(&inside, &outside, "Book"), SafetyVerdict::Allow);
        assert!(matches!(
            gate.check(&outside, &inside, "Book"),
            SafetyVerdict::Deny { .. }
        ));
        Ok(())
    }
}
