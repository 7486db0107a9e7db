use std::io;
use std::path::PathBuf;

use enhancer_archive::ArchiveError;
use enhancer_core::PatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("target is not patched: no backup archive at {}", backup.display())]
    NotPatched { backup: PathBuf },
    #[error("target is already patched: backup archive exists at {}", backup.display())]
    AlreadyPatched { backup: PathBuf },
    #[error(
        "another enhancer run holds {}{}; if no run is active, delete that file and retry",
        lock.display(),
        holder.as_deref().map(|h| format!(" ({h})")).unwrap_or_default()
    )]
    Busy {
        lock: PathBuf,
        holder: Option<String>,
    },
    #[error("target not found at {}: {reason}", path.display())]
    TargetNotFound { path: PathBuf, reason: String },
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("{cause}; restoring the backup archive also failed: {restore}")]
    Rollback {
        cause: ArchiveError,
        restore: io::Error,
    },
}

/// Reasons a single installer step is abandoned. Never fatal to the pipeline.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error("failed to {action} {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("required external tool '{tool}' was not found")]
    ExternalToolMissing { tool: String },
    #[error("package '{package}' is not installed at {}", path.display())]
    PackageMissing { package: String, path: PathBuf },
    #[error("prerequisite step '{step}' did not apply")]
    PrerequisiteNotApplied { step: String },
    #[error("'{program}' exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },
}
