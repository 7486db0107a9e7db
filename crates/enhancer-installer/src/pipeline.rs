use std::fs;
use std::io;
use std::path::PathBuf;

use enhancer_archive::{ArchiveCodec, AsarCodec};
use enhancer_core::MissingReference;
use tracing::{info, warn};

use crate::error::{PipelineError, StepError};
use crate::fs_utils::{remove_dir_if_exists, remove_file_if_exists};
use crate::layout::TargetLayout;
use crate::lock::{read_lock_holder, PipelineLock};
use crate::options::PatchOptions;
use crate::steps::{execute_step, installer_steps, InstallerStep};

/// Derived solely from the presence of the backup archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    Pristine,
    Patched,
}

impl PatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pristine => "pristine",
            Self::Patched => "patched",
        }
    }
}

pub fn patch_state(layout: &TargetLayout) -> PatchState {
    if layout.backup_archive_path().is_file() {
        PatchState::Patched
    } else {
        PatchState::Pristine
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStatus {
    pub state: PatchState,
    pub working_archive_present: bool,
    pub source_tree_present: bool,
    pub lock_holder: Option<String>,
}

pub fn inspect(layout: &TargetLayout) -> TargetStatus {
    let lock = layout.lock_path();
    TargetStatus {
        state: patch_state(layout),
        working_archive_present: layout.working_archive_path().is_file(),
        source_tree_present: layout.source_tree_dir().is_dir(),
        lock_holder: lock
            .exists()
            .then(|| read_lock_holder(&lock).unwrap_or_else(|| "unknown holder".to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied { warnings: Vec<MissingReference> },
    Skipped,
    Abandoned { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub auto_reverted: bool,
    pub steps: Vec<StepReport>,
    pub source_tree_kept: bool,
}

impl PatchReport {
    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn warning_count(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match &step.outcome {
                StepOutcome::Applied { warnings } => warnings.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn abandoned_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Abandoned { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Reverting,
    Extracting,
    BackingUp,
    Repacking,
    RollingBack,
    RemovingSourceTree,
}

/// Progress hooks; every method defaults to doing nothing.
pub trait PipelineObserver {
    fn stage(&mut self, _stage: PipelineStage) {}

    fn step_started(&mut self, _index: usize, _total: usize, _name: &str) {}

    fn step_finished(&mut self, _report: &StepReport) {}
}

#[derive(Debug, Default)]
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {}

/// Patches the target, first reverting an earlier patch if one is present.
pub fn patch(layout: &TargetLayout, options: &PatchOptions) -> Result<PatchReport, PipelineError> {
    patch_with_hooks(layout, options, &AsarCodec, &mut SilentObserver)
}

pub fn patch_with_codec(
    layout: &TargetLayout,
    options: &PatchOptions,
    codec: &dyn ArchiveCodec,
) -> Result<PatchReport, PipelineError> {
    patch_with_hooks(layout, options, codec, &mut SilentObserver)
}

pub fn patch_with_hooks(
    layout: &TargetLayout,
    options: &PatchOptions,
    codec: &dyn ArchiveCodec,
    observer: &mut dyn PipelineObserver,
) -> Result<PatchReport, PipelineError> {
    let _lock = PipelineLock::acquire(layout, "patch")?;

    let auto_reverted = patch_state(layout) == PatchState::Patched;
    if auto_reverted {
        info!("target is already patched; restoring the original archive first");
        observer.stage(PipelineStage::Reverting);
        restore_backup(layout)?;
    }

    let mut report = run_patch(layout, options, codec, observer)?;
    report.auto_reverted = auto_reverted;
    Ok(report)
}

/// Patches a pristine target. Refuses to run when a backup already exists.
pub fn patch_pristine(
    layout: &TargetLayout,
    options: &PatchOptions,
) -> Result<PatchReport, PipelineError> {
    let _lock = PipelineLock::acquire(layout, "patch")?;
    if patch_state(layout) == PatchState::Patched {
        return Err(PipelineError::AlreadyPatched {
            backup: layout.backup_archive_path(),
        });
    }
    run_patch(layout, options, &AsarCodec, &mut SilentObserver)
}

/// Puts the backup archive back in place of the working archive.
pub fn unpatch(layout: &TargetLayout) -> Result<(), PipelineError> {
    let _lock = PipelineLock::acquire(layout, "unpatch")?;
    restore_backup(layout)
}

/// Extracts the working (or backup) archive into the source tree without
/// touching either archive.
pub fn extract_only(layout: &TargetLayout, from_backup: bool) -> Result<PathBuf, PipelineError> {
    let _lock = PipelineLock::acquire(layout, "extract")?;
    let archive = if from_backup {
        let backup = layout.backup_archive_path();
        if !backup.is_file() {
            return Err(PipelineError::NotPatched { backup });
        }
        backup
    } else {
        layout.working_archive_path()
    };

    let source_tree = layout.source_tree_dir();
    AsarCodec.extract(&archive, &source_tree)?;
    info!(
        archive = %archive.display(),
        source_tree = %source_tree.display(),
        "source files extracted"
    );
    Ok(source_tree)
}

fn run_patch(
    layout: &TargetLayout,
    options: &PatchOptions,
    codec: &dyn ArchiveCodec,
    observer: &mut dyn PipelineObserver,
) -> Result<PatchReport, PipelineError> {
    let working = layout.working_archive_path();
    let backup = layout.backup_archive_path();
    let source_tree = layout.source_tree_dir();

    observer.stage(PipelineStage::Extracting);
    codec.extract(&working, &source_tree)?;
    info!(source_tree = %source_tree.display(), "source files extracted");

    let steps = installer_steps(layout, options);
    let total = steps.len();
    let mut reports = Vec::with_capacity(total);
    for (index, step) in steps.iter().enumerate() {
        observer.step_started(index, total, &step.name);
        let outcome = if !step.enabled {
            StepOutcome::Skipped
        } else if let Some(missing) = unmet_prerequisite(step, &reports) {
            let err = StepError::PrerequisiteNotApplied {
                step: missing.to_string(),
            };
            warn!(step = step.name.as_str(), error = %err, "step abandoned");
            StepOutcome::Abandoned {
                reason: err.to_string(),
            }
        } else {
            match execute_step(step, &source_tree) {
                Ok(warnings) => {
                    info!(step = step.name.as_str(), warnings = warnings.len(), "step applied");
                    StepOutcome::Applied { warnings }
                }
                Err(err) => {
                    warn!(step = step.name.as_str(), error = %err, "step abandoned");
                    StepOutcome::Abandoned {
                        reason: err.to_string(),
                    }
                }
            }
        };
        let report = StepReport {
            name: step.name.clone(),
            outcome,
        };
        observer.step_finished(&report);
        reports.push(report);
    }

    observer.stage(PipelineStage::BackingUp);
    if let Err(source) = fs::copy(&working, &backup) {
        let _ = remove_file_if_exists(&backup);
        return Err(PipelineError::Io {
            context: format!("failed to back up {}", working.display()),
            source,
        });
    }
    if let Err(source) = fs::remove_file(&working) {
        let _ = remove_file_if_exists(&backup);
        return Err(PipelineError::Io {
            context: format!("failed to remove {}", working.display()),
            source,
        });
    }
    info!(backup = %backup.display(), "original archive backed up");

    observer.stage(PipelineStage::Repacking);
    if let Err(cause) = codec.repack(&source_tree, &working) {
        warn!(error = %cause, "repack failed; restoring the original archive");
        observer.stage(PipelineStage::RollingBack);
        return Err(match roll_back_repack(layout) {
            Ok(()) => PipelineError::Archive(cause),
            Err(restore) => PipelineError::Rollback { cause, restore },
        });
    }
    info!(archive = %working.display(), "patched archive written");

    let mut source_tree_kept = options.keep_source_tree;
    if !source_tree_kept {
        observer.stage(PipelineStage::RemovingSourceTree);
        if let Err(err) = remove_dir_if_exists(&source_tree) {
            warn!(
                source_tree = %source_tree.display(),
                error = %err,
                "failed to remove source files"
            );
            source_tree_kept = true;
        }
    }

    Ok(PatchReport {
        auto_reverted: false,
        steps: reports,
        source_tree_kept,
    })
}

fn unmet_prerequisite<'a>(step: &'a InstallerStep, reports: &[StepReport]) -> Option<&'a str> {
    step.requires
        .iter()
        .find(|required| {
            !reports.iter().any(|report| {
                &report.name == *required && matches!(report.outcome, StepOutcome::Applied { .. })
            })
        })
        .map(String::as_str)
}

fn roll_back_repack(layout: &TargetLayout) -> io::Result<()> {
    let working = layout.working_archive_path();
    let backup = layout.backup_archive_path();
    remove_file_if_exists(&working)?;
    fs::copy(&backup, &working)?;
    fs::remove_file(&backup)
}

fn restore_backup(layout: &TargetLayout) -> Result<(), PipelineError> {
    let working = layout.working_archive_path();
    let backup = layout.backup_archive_path();
    if !backup.is_file() {
        return Err(PipelineError::NotPatched { backup });
    }

    remove_file_if_exists(&working).map_err(|source| PipelineError::Io {
        context: format!("failed to remove {}", working.display()),
        source,
    })?;
    fs::rename(&backup, &working).map_err(|source| PipelineError::Io {
        context: format!(
            "failed to move {} back to {}",
            backup.display(),
            working.display()
        ),
        source,
    })?;
    info!(archive = %working.display(), "original archive restored");
    Ok(())
}

