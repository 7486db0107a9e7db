use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::fs_utils::remove_file_if_exists;
use crate::layout::TargetLayout;

/// Marker file claimed for the duration of one pipeline run. Removed on drop.
#[derive(Debug)]
pub struct PipelineLock {
    path: PathBuf,
}

impl PipelineLock {
    pub fn acquire(layout: &TargetLayout, operation: &str) -> Result<Self, PipelineError> {
        let path = layout.lock_path();
        let mut file = match claim(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let holder = read_lock_holder(&path);
                if !holder_is_gone(holder.as_deref()) {
                    return Err(PipelineError::Busy { holder, lock: path });
                }
                warn!(
                    lock = %path.display(),
                    holder = holder.as_deref().unwrap_or_default(),
                    "removing lock left behind by a process that is no longer running"
                );
                remove_file_if_exists(&path).map_err(|source| PipelineError::Io {
                    context: format!("failed to remove stale pipeline lock {}", path.display()),
                    source,
                })?;
                claim(&path).map_err(|err| claim_error(&path, err))?
            }
            Err(err) => return Err(claim_error(&path, err)),
        };

        let holder = format!(
            "pid={} operation={operation} started_at_unix={}\n",
            std::process::id(),
            current_unix_timestamp()
        );
        let written = file
            .write_all(holder.as_bytes())
            .and_then(|()| file.flush());
        if let Err(source) = written {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(PipelineError::Io {
                context: format!("failed to write pipeline lock {}", path.display()),
                source,
            });
        }

        debug!(lock = %path.display(), operation, "pipeline lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for PipelineLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(lock = %self.path.display(), error = %err, "failed to release pipeline lock");
            }
        }
    }
}

fn claim(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
}

fn claim_error(path: &Path, err: io::Error) -> PipelineError {
    if err.kind() == io::ErrorKind::AlreadyExists {
        return PipelineError::Busy {
            holder: read_lock_holder(path),
            lock: path.to_path_buf(),
        };
    }
    PipelineError::Io {
        context: format!("failed to claim pipeline lock {}", path.display()),
        source: err,
    }
}

/// True only when the recorded pid is known to have exited.
fn holder_is_gone(holder: Option<&str>) -> bool {
    holder
        .and_then(holder_pid)
        .is_some_and(|pid| pid != std::process::id() && !process_is_running(pid))
}

fn holder_pid(holder: &str) -> Option<u32> {
    holder
        .split_whitespace()
        .find_map(|field| field.strip_prefix("pid="))
        .and_then(|pid| pid.parse().ok())
}

#[cfg(target_os = "linux")]
fn process_is_running(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_is_running(_pid: u32) -> bool {
    true
}

pub(crate) fn read_lock_holder(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let holder = raw.trim();
    (!holder.is_empty()).then(|| holder.to_string())
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
