use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::snapshot::filter::FailurePolicy;

/// Patterns pruned from the installed tree before it is snapshotted.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &["*.md", "*.d.*", "*.map", "LICENSE", "license"];

/// Output location of the published snapshot, relative to the root.
pub const DEFAULT_OUTPUT: &str = "public/snapshot";

/// `package.json` record written into every workspace before install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,

    /// Module format flag (`"module"` for ES modules)
    #[serde(rename = "type")]
    pub module_type: String,

    pub version: String,

    /// Dependency name → version constraint
    pub dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Manifest with the given dependencies and placeholder package identity.
    pub fn with_dependencies<I, K, V>(dependencies: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: "example".to_string(),
            module_type: "module".to_string(),
            version: "0.0.0".to_string(),
            dependencies: dependencies
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::with_dependencies([
            ("@bomb.sh/args", "latest"),
            ("@clack/core", "1.0.0-alpha.0"),
            ("@clack/prompts", "1.0.0-alpha.0"),
        ])
    }
}

/// Parameters of a single snapshot run.
///
/// Everything the pipeline needs besides its installer and serializer
/// stages lives here, so alternative dependency sets or pattern lists can
/// be exercised without touching pipeline code.
///
/// Defaults:
/// - manifest: [`Manifest::default`]
/// - ignore patterns: [`DEFAULT_IGNORE_PATTERNS`]
/// - output: [`DEFAULT_OUTPUT`] under `root`
/// - filter policy: [`FailurePolicy::Continue`]
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Directory that hosts workspaces and the published artifact
    pub root: PathBuf,

    /// Artifact path; relative paths are resolved against `root`
    pub output: PathBuf,

    pub manifest: Manifest,

    pub ignore_patterns: Vec<String>,

    pub filter_policy: FailurePolicy,
}

impl SnapshotConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            manifest: Manifest::default(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            filter_policy: FailurePolicy::default(),
        }
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter_policy(mut self, policy: FailurePolicy) -> Self {
        self.filter_policy = policy;
        self
    }

    /// Absolute (or root-joined) location the artifact is written to.
    pub fn output_path(&self) -> PathBuf {
        resolve(&self.root, &self.output)
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
