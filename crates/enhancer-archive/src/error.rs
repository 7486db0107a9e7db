use std::fmt::Display;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot read archive {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },
    #[error("cannot write archive {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
    #[error("cannot extract into {}: {reason}", path.display())]
    Extract { path: PathBuf, reason: String },
}

impl ArchiveError {
    pub(crate) fn read(path: &Path, reason: impl Display) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: &Path, reason: impl Display) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn extract(path: &Path, reason: impl Display) -> Self {
        Self::Extract {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
