use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::modification::{InsertMode, Modification};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("file not found: {}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write patched file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An anchor that was absent from the file; the modification was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReference {
    pub file: PathBuf,
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOutcome {
    pub applied: usize,
    pub missing: Vec<MissingReference>,
}

/// Accumulator threaded through the modification fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPatch {
    pub text: String,
    pub applied: usize,
    pub missing: Vec<String>,
}

/// Applies one modification, or returns `None` when its reference is absent.
pub fn apply_modification(text: &str, modification: &Modification) -> Option<String> {
    let start = modification.reference.find(text)?;

    let next = match modification.insert_mode {
        InsertMode::AfterMatchingLine => {
            let mut lines = text
                .split('\n')
                .map(|line| line.strip_suffix('\r').unwrap_or(line))
                .collect::<Vec<_>>();
            let matched_index = text[..start].matches('\n').count() as i64;
            let insert_at = (matched_index + 1 + modification.line_offset)
                .clamp(0, lines.len() as i64) as usize;
            lines.insert(insert_at, modification.payload.as_str());
            lines.join("\n")
        }
        InsertMode::AtMatchOffset => {
            let mut spliced = String::with_capacity(text.len() + modification.payload.len());
            spliced.push_str(&text[..start]);
            spliced.push_str(&modification.payload);
            spliced.push_str(&text[start..]);
            spliced
        }
        InsertMode::ReplaceAllMatches => modification
            .reference
            .replace_all(text, &modification.payload)
            .into_owned(),
    };
    Some(next)
}

/// Folds `modifications` over `text` in order; each one sees the output of
/// the ones before it.
pub fn apply_to_text(text: &str, modifications: &[Modification]) -> TextPatch {
    let initial = TextPatch {
        text: text.to_string(),
        applied: 0,
        missing: Vec::new(),
    };

    modifications
        .iter()
        .fold(initial, |mut current, modification| {
            match apply_modification(&current.text, modification) {
                Some(next) => {
                    debug!(
                        reference = %modification.reference,
                        mode = modification.insert_mode.as_str(),
                        "modification applied"
                    );
                    current.text = next;
                    current.applied += 1;
                }
                None => current.missing.push(modification.reference.to_string()),
            }
            current
        })
}

/// Reads `path`, applies every modification and writes the result once.
///
/// Absent references are reported in the outcome and logged, never raised.
pub fn apply_modifications(
    path: &Path,
    modifications: &[Modification],
) -> Result<PatchOutcome, PatchError> {
    let original = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            PatchError::FileNotFound {
                path: path.to_path_buf(),
                source,
            }
        } else {
            PatchError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let patched = apply_to_text(&original, modifications);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    for reference in &patched.missing {
        warn!("reference {reference} not found in file {file_name}; skipping modification");
    }

    fs::write(path, patched.text.as_bytes()).map_err(|source| PatchError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(PatchOutcome {
        applied: patched.applied,
        missing: patched
            .missing
            .into_iter()
            .map(|reference| MissingReference {
                file: path.to_path_buf(),
                reference,
            })
            .collect(),
    })
}
