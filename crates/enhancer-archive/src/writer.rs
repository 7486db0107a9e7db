use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use enhancer_integrity::{file_integrity, ASAR_BLOCK_SIZE};
use tracing::debug;

use crate::error::ArchiveError;
use crate::header::{
    encode_header, ArchiveHeader, DirectoryEntry, FileEntry, HeaderEntry, IntegrityRecord,
    LinkEntry, INTEGRITY_ALGORITHM,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub files: usize,
    pub links: usize,
    pub bytes: u64,
}

struct PendingFile {
    source: PathBuf,
    rel: String,
    size: u64,
}

struct PackPlan {
    header: ArchiveHeader,
    files: Vec<PendingFile>,
    links: usize,
    next_offset: u64,
}

/// Packs `src_dir` into `archive_path`.
///
/// Every file is stored inline, in sorted path order. The archive is written
/// to a sibling `.partial` file and renamed over `archive_path` at the end.
pub fn pack_directory(src_dir: &Path, archive_path: &Path) -> Result<PackSummary, ArchiveError> {
    if !src_dir.is_dir() {
        return Err(ArchiveError::write(
            archive_path,
            format!("source tree not found: {}", src_dir.display()),
        ));
    }
    let canonical_root = fs::canonicalize(src_dir).map_err(|err| {
        ArchiveError::write(
            archive_path,
            format!("failed to resolve {}: {err}", src_dir.display()),
        )
    })?;

    let mut plan = PackPlan {
        header: ArchiveHeader::default(),
        files: Vec::new(),
        links: 0,
        next_offset: 0,
    };
    let root_files = plan_directory(&canonical_root, src_dir, "", archive_path, &mut plan)?;
    plan.header.files = root_files;

    let encoded =
        encode_header(&plan.header).map_err(|err| ArchiveError::write(archive_path, err))?;
    let partial_path = partial_path_for(archive_path);
    let write_result = write_archive(&partial_path, &encoded, &plan.files);
    if let Err(err) = write_result {
        let _ = fs::remove_file(&partial_path);
        return Err(ArchiveError::write(archive_path, err));
    }
    fs::rename(&partial_path, archive_path).map_err(|err| {
        let _ = fs::remove_file(&partial_path);
        ArchiveError::write(
            archive_path,
            format!("failed to move packed archive into place: {err}"),
        )
    })?;

    let summary = PackSummary {
        files: plan.files.len(),
        links: plan.links,
        bytes: plan.next_offset,
    };
    debug!(
        archive = %archive_path.display(),
        files = summary.files,
        links = summary.links,
        bytes = summary.bytes,
        "archive packed"
    );
    Ok(summary)
}

fn plan_directory(
    canonical_root: &Path,
    dir: &Path,
    prefix: &str,
    archive_path: &Path,
    plan: &mut PackPlan,
) -> Result<BTreeMap<String, HeaderEntry>, ArchiveError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| {
        ArchiveError::write(archive_path, format!("failed to list {}: {err}", dir.display()))
    })? {
        let entry = entry.map_err(|err| {
            ArchiveError::write(archive_path, format!("failed to list {}: {err}", dir.display()))
        })?;
        let name = entry.file_name().into_string().map_err(|raw| {
            ArchiveError::write(
                archive_path,
                format!("non UTF-8 file name in {}: {raw:?}", dir.display()),
            )
        })?;
        names.push(name);
    }
    names.sort();

    let mut children = BTreeMap::new();
    for name in names {
        let path = dir.join(&name);
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        let metadata = fs::symlink_metadata(&path).map_err(|err| {
            ArchiveError::write(archive_path, format!("failed to stat {}: {err}", path.display()))
        })?;

        let entry = if metadata.file_type().is_symlink() {
            plan.links += 1;
            HeaderEntry::Link(LinkEntry {
                link: link_target(canonical_root, &path, archive_path)?,
            })
        } else if metadata.is_dir() {
            HeaderEntry::Directory(DirectoryEntry {
                files: plan_directory(canonical_root, &path, &rel, archive_path, plan)?,
                unpacked: false,
            })
        } else {
            let size = metadata.len();
            let integrity = hash_file(&path).map_err(|err| {
                ArchiveError::write(
                    archive_path,
                    format!("failed to hash {}: {err}", path.display()),
                )
            })?;
            let offset = plan.next_offset;
            plan.next_offset += size;
            plan.files.push(PendingFile {
                source: path.clone(),
                rel,
                size,
            });
            HeaderEntry::File(FileEntry {
                size,
                offset: Some(offset.to_string()),
                executable: is_executable(&metadata),
                unpacked: false,
                integrity: Some(integrity),
            })
        };
        children.insert(name, entry);
    }
    Ok(children)
}

fn hash_file(path: &Path) -> io::Result<IntegrityRecord> {
    let file = File::open(path)?;
    let integrity = file_integrity(BufReader::new(file), ASAR_BLOCK_SIZE)?;
    Ok(IntegrityRecord {
        algorithm: INTEGRITY_ALGORITHM.to_string(),
        hash: integrity.hash,
        block_size: integrity.block_size,
        blocks: integrity.blocks,
    })
}

/// Link targets are stored relative to the archive root and must stay in it.
fn link_target(
    canonical_root: &Path,
    link: &Path,
    archive_path: &Path,
) -> Result<String, ArchiveError> {
    let resolved = fs::canonicalize(link).map_err(|err| {
        ArchiveError::write(
            archive_path,
            format!("failed to resolve link {}: {err}", link.display()),
        )
    })?;
    let relative = resolved.strip_prefix(canonical_root).map_err(|_| {
        ArchiveError::write(
            archive_path,
            format!("link {} points outside the source tree", link.display()),
        )
    })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => {
                return Err(ArchiveError::write(
                    archive_path,
                    format!("link {} has an unsupported target", link.display()),
                ));
            }
        }
    }
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o100 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

fn partial_path_for(archive_path: &Path) -> PathBuf {
    let mut name = archive_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    archive_path.with_file_name(name)
}

fn write_archive(partial_path: &Path, header: &[u8], files: &[PendingFile]) -> Result<(), String> {
    let output = File::create(partial_path)
        .map_err(|err| format!("failed to create {}: {err}", partial_path.display()))?;
    let mut writer = BufWriter::new(output);
    writer
        .write_all(header)
        .map_err(|err| format!("failed to write header: {err}"))?;

    for pending in files {
        let source = File::open(&pending.source)
            .map_err(|err| format!("failed to open {}: {err}", pending.source.display()))?;
        let copied = io::copy(&mut source.take(pending.size), &mut writer)
            .map_err(|err| format!("failed to copy {}: {err}", pending.rel))?;
        if copied != pending.size {
            return Err(format!(
                "{} changed while packing: expected {} bytes, read {copied}",
                pending.rel, pending.size
            ));
        }
    }

    let output = writer
        .into_inner()
        .map_err(|err| format!("failed to flush archive: {}", err.error()))?;
    output
        .sync_all()
        .map_err(|err| format!("failed to sync archive: {err}"))
}
