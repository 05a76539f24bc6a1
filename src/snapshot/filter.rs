//! Post-install pruning of files the sandbox never reads.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::snapshot::traits::FilterError;

/// What to do when a single file cannot be removed or scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure, record it in the report and keep pruning
    #[default]
    Continue,

    /// Stop at the first failure and fail the run
    Abort,
}

/// Compiled ignore pattern set.
///
/// Every pattern is anchored as `**/<pattern>` with `/`-aware wildcards, so
/// `LICENSE` matches at any depth while `*.md` never spans directories.
#[derive(Debug, Clone)]
pub struct IgnorePatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl IgnorePatterns {
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] for a malformed glob.
    pub fn new<I, S>(patterns: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let glob = GlobBuilder::new(&format!("**/{pattern}"))
                .literal_separator(true)
                .build()
                .map_err(|e| FilterError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|e| FilterError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;
        Ok(Self { patterns, set })
    }

    /// Whether a root-relative path should be pruned.
    pub fn is_match(&self, relative: &Path) -> bool {
        self.set.is_match(relative)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Outcome of a pruning pass.
#[derive(Debug, Default, Clone)]
pub struct PruneReport {
    /// Removed files, relative to the pruned root
    pub removed: Vec<PathBuf>,

    pub bytes_removed: u64,

    /// Files that matched but could not be removed, or could not be scanned
    pub failures: Vec<PruneFailure>,
}

#[derive(Debug, Clone)]
pub struct PruneFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Deletes every non-directory entry under `root` whose relative path
/// matches `patterns`.
///
/// Running it again on a pruned tree removes nothing.
///
/// # Errors
///
/// Only under [`FailurePolicy::Abort`]: the first scan or removal failure.
pub fn prune(
    root: &Path,
    patterns: &IgnorePatterns,
    policy: FailurePolicy,
) -> Result<PruneReport, FilterError> {
    let mut report = PruneReport::default();
    let mut matched = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                if policy == FailurePolicy::Abort {
                    return Err(FilterError::Walk(e));
                }
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                report.failures.push(PruneFailure {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if patterns.is_match(relative) {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            matched.push((relative.to_path_buf(), size));
        }
    }

    for (relative, size) in matched {
        let path = root.join(&relative);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                report.bytes_removed += size;
                report.removed.push(relative);
            }
            Err(source) => {
                if policy == FailurePolicy::Abort {
                    return Err(FilterError::Remove { path, source });
                }
                warn!(path = %path.display(), error = %source, "Failed to remove file");
                report.failures.push(PruneFailure {
                    path,
                    reason: source.to_string(),
                });
            }
        }
    }

    debug!(
        removed = report.removed.len(),
        bytes = report.bytes_removed,
        failures = report.failures.len(),
        "Prune finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_IGNORE_PATTERNS;

    fn default_patterns() -> IgnorePatterns {
        IgnorePatterns::new(DEFAULT_IGNORE_PATTERNS.iter().copied()).unwrap()
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"content").unwrap();
    }

    fn remaining_files(root: &Path) -> Vec<String> {
        let mut files: Vec<String> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .map(|e| {
                e.path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_pattern_matching() {
        let patterns = default_patterns();

        assert!(patterns.is_match(Path::new("README.md")));
        assert!(patterns.is_match(Path::new("node_modules/a/docs/guide.md")));
        assert!(patterns.is_match(Path::new("index.d.ts")));
        assert!(patterns.is_match(Path::new("node_modules/a/dist/index.d.mts")));
        assert!(patterns.is_match(Path::new("out.js.map")));
        assert!(patterns.is_match(Path::new("LICENSE")));
        assert!(patterns.is_match(Path::new("node_modules/@scope/pkg/license")));

        assert!(!patterns.is_match(Path::new("main.js")));
        assert!(!patterns.is_match(Path::new("node_modules/a/LICENSE.txt")));
        assert!(!patterns.is_match(Path::new("node_modules/a/package.json")));
    }

    #[test]
    fn test_prune_leaves_only_runtime_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["README.md", "index.d.ts", "out.js.map", "LICENSE", "main.js"] {
            touch(dir.path(), name);
        }

        let report = prune(dir.path(), &default_patterns(), FailurePolicy::Continue).unwrap();

        assert_eq!(remaining_files(dir.path()), vec!["main.js"]);
        assert_eq!(report.removed.len(), 4);
        assert_eq!(report.bytes_removed, 4 * "content".len() as u64);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_prune_matches_at_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "node_modules/a/LICENSE");
        touch(dir.path(), "node_modules/a/lib/index.js");
        touch(dir.path(), "node_modules/a/lib/index.d.ts");
        touch(dir.path(), "node_modules/@s/b/license");
        touch(dir.path(), "node_modules/@s/b/README.md");
        touch(dir.path(), "node_modules/@s/b/package.json");

        prune(dir.path(), &default_patterns(), FailurePolicy::Continue).unwrap();

        assert_eq!(
            remaining_files(dir.path()),
            vec!["node_modules/@s/b/package.json", "node_modules/a/lib/index.js"]
        );
    }

    #[test]
    fn test_prune_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pkg/README.md");
        touch(dir.path(), "pkg/index.js");

        let first = prune(dir.path(), &default_patterns(), FailurePolicy::Continue).unwrap();
        let second = prune(dir.path(), &default_patterns(), FailurePolicy::Continue).unwrap();

        assert_eq!(first.removed.len(), 1);
        assert!(second.removed.is_empty());
        assert_eq!(remaining_files(dir.path()), vec!["pkg/index.js"]);
    }

    #[test]
    fn test_directories_are_never_removed() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "docs.md/keep.js");

        prune(dir.path(), &default_patterns(), FailurePolicy::Continue).unwrap();
        assert_eq!(remaining_files(dir.path()), vec!["docs.md/keep.js"]);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result = IgnorePatterns::new(["[unclosed"]);
        assert!(matches!(result, Err(FilterError::InvalidPattern { .. })));
    }

    #[test]
    fn test_missing_root_under_both_policies() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");

        let report = prune(&missing, &default_patterns(), FailurePolicy::Continue).unwrap();
        assert_eq!(report.failures.len(), 1);

        let result = prune(&missing, &default_patterns(), FailurePolicy::Abort);
        assert!(matches!(result, Err(FilterError::Walk(_))));
    }

    #[test]
    fn test_patterns_are_kept_in_order() {
        let patterns = default_patterns();
        assert_eq!(patterns.patterns(), DEFAULT_IGNORE_PATTERNS);
    }

    // Makes `dir` read-only. Returns false when the process can still write
    // into it (privileged users), in which case removal cannot be made to fail.
    #[cfg(unix)]
    fn deny_writes(dir: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o555)).unwrap();
        let check = dir.join(".write-check");
        if std::fs::write(&check, b"").is_ok() {
            std::fs::remove_file(&check).ok();
            allow_writes(dir);
            return false;
        }
        true
    }

    #[cfg(unix)]
    fn allow_writes(dir: &Path) {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_undeletable_file_is_recorded_under_continue() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "locked/README.md");
        touch(dir.path(), "locked/index.js");
        touch(dir.path(), "open/LICENSE");
        let locked = dir.path().join("locked");
        if !deny_writes(&locked) {
            return;
        }

        let report = prune(dir.path(), &default_patterns(), FailurePolicy::Continue);
        allow_writes(&locked);
        let report = report.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, locked.join("README.md"));
        assert_eq!(report.removed, vec![PathBuf::from("open/LICENSE")]);
        assert_eq!(
            remaining_files(dir.path()),
            vec!["locked/README.md", "locked/index.js"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_undeletable_file_fails_under_abort() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "locked/README.md");
        let locked = dir.path().join("locked");
        if !deny_writes(&locked) {
            return;
        }

        let result = prune(dir.path(), &default_patterns(), FailurePolicy::Abort);
        allow_writes(&locked);

        match result {
            Err(FilterError::Remove { path, .. }) => assert_eq!(path, locked.join("README.md")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
