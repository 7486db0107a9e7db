use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::error::PipelineError;

const WORKING_ARCHIVE: &str = "app.asar";
const BACKUP_ARCHIVE: &str = "app_original.asar";
const SOURCE_TREE: &str = "src";
const LOCK_MARKER: &str = ".enhancer.lock";

/// Paths inside one installation's `resources` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    resources: PathBuf,
}

impl TargetLayout {
    pub fn new(resources: impl Into<PathBuf>) -> Self {
        Self {
            resources: resources.into(),
        }
    }

    pub fn resources_dir(&self) -> &Path {
        &self.resources
    }

    pub fn working_archive_path(&self) -> PathBuf {
        self.resources.join(WORKING_ARCHIVE)
    }

    pub fn backup_archive_path(&self) -> PathBuf {
        self.resources.join(BACKUP_ARCHIVE)
    }

    pub fn source_tree_dir(&self) -> PathBuf {
        self.resources.join(SOURCE_TREE)
    }

    /// Root of the main-process sources inside the extracted tree.
    pub fn main_dir(&self) -> PathBuf {
        self.source_tree_dir().join("app").join("main")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.resources.join(LOCK_MARKER)
    }
}

/// Picks the `resources` directory of the newest `app-<version>` install
/// under `install_root`.
pub fn resolve_resources_dir(install_root: &Path) -> Result<PathBuf, PipelineError> {
    let entries = fs::read_dir(install_root).map_err(|source| PipelineError::Io {
        context: format!("failed to list install root {}", install_root.display()),
        source,
    })?;

    let mut newest: Option<(Version, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::Io {
            context: format!("failed to list install root {}", install_root.display()),
            source,
        })?;
        let name = entry.file_name();
        let Some(version) = name
            .to_str()
            .and_then(|name| name.strip_prefix("app-"))
            .and_then(|raw| Version::parse(raw).ok())
        else {
            continue;
        };
        let resources = entry.path().join("resources");
        if !resources.is_dir() {
            continue;
        }
        match &newest {
            Some((current, _)) if *current >= version => {}
            _ => newest = Some((version, resources)),
        }
    }

    newest
        .map(|(_, resources)| resources)
        .ok_or_else(|| PipelineError::TargetNotFound {
            path: install_root.to_path_buf(),
            reason: "no app-<version>/resources directory".to_string(),
        })
}
