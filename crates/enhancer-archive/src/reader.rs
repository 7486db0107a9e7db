use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use enhancer_integrity::file_integrity;
use tracing::{debug, warn};

use crate::error::ArchiveError;
use crate::header::{
    read_header, validate_entry_name, FileEntry, HeaderEntry, INTEGRITY_ALGORITHM,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub links: usize,
}

/// A file recorded in an archive header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub path: String,
    pub size: u64,
    pub unpacked: bool,
    pub executable: bool,
}

struct OpenArchive {
    file: File,
    len: u64,
    data_offset: u64,
    entries: Vec<(String, HeaderEntry)>,
}

fn open_archive(archive_path: &Path) -> Result<OpenArchive, ArchiveError> {
    if !archive_path.is_file() {
        return Err(ArchiveError::read(archive_path, "archive file not found"));
    }

    let file = File::open(archive_path)
        .map_err(|err| ArchiveError::read(archive_path, format!("open failed: {err}")))?;
    let len = file
        .metadata()
        .map_err(|err| ArchiveError::read(archive_path, format!("metadata failed: {err}")))?
        .len();

    let mut reader = BufReader::new(&file);
    let decoded = read_header(&mut reader).map_err(|err| ArchiveError::read(archive_path, err))?;
    if decoded.data_offset > len {
        return Err(ArchiveError::read(
            archive_path,
            "header extends past end of archive",
        ));
    }

    Ok(OpenArchive {
        file,
        len,
        data_offset: decoded.data_offset,
        entries: flatten_entries(archive_path, decoded.header.files)?,
    })
}

/// Walks the header tree depth-first, yielding `/`-joined relative paths with
/// every parent before its children.
fn flatten_entries(
    archive_path: &Path,
    root: std::collections::BTreeMap<String, HeaderEntry>,
) -> Result<Vec<(String, HeaderEntry)>, ArchiveError> {
    let mut flattened = Vec::new();
    let mut stack = vec![(String::new(), root)];

    while let Some((prefix, children)) = stack.pop() {
        for (name, entry) in children {
            validate_entry_name(&name).map_err(|err| ArchiveError::read(archive_path, err))?;
            let rel = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            match entry {
                HeaderEntry::Directory(directory) => {
                    flattened.push((
                        rel.clone(),
                        HeaderEntry::Directory(Default::default()),
                    ));
                    stack.push((rel, directory.files));
                }
                other => flattened.push((rel, other)),
            }
        }
    }

    Ok(flattened)
}

pub fn list_files(archive_path: &Path) -> Result<Vec<ArchivedFile>, ArchiveError> {
    let archive = open_archive(archive_path)?;
    let mut files = archive
        .entries
        .into_iter()
        .filter_map(|(path, entry)| match entry {
            HeaderEntry::File(file) => Some(ArchivedFile {
                path,
                size: file.size,
                unpacked: file.unpacked,
                executable: file.executable,
            }),
            _ => None,
        })
        .collect::<Vec<_>>();
    files.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(files)
}

/// Replaces `dest_dir` with the contents of `archive_path`.
pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
) -> Result<ExtractSummary, ArchiveError> {
    let mut archive = open_archive(archive_path)?;

    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir).map_err(|err| {
            ArchiveError::extract(dest_dir, format!("failed to clear destination: {err}"))
        })?;
    }
    fs::create_dir_all(dest_dir)
        .map_err(|err| ArchiveError::extract(dest_dir, format!("failed to create: {err}")))?;

    let unpacked_root = unpacked_dir_for(archive_path);
    let mut summary = ExtractSummary::default();
    let entries = std::mem::take(&mut archive.entries);
    for (rel, entry) in entries {
        let destination = dest_dir.join(&rel);
        match entry {
            HeaderEntry::Directory(_) => {
                fs::create_dir_all(&destination).map_err(|err| {
                    ArchiveError::extract(&destination, format!("failed to create: {err}"))
                })?;
                summary.directories += 1;
            }
            HeaderEntry::File(file) => {
                if file.unpacked {
                    copy_unpacked_file(&unpacked_root, &rel, &destination)?;
                } else {
                    copy_packed_file(&mut archive, archive_path, &rel, &file, &destination)?;
                }
                if let Some(integrity) = &file.integrity {
                    verify_integrity(archive_path, &rel, &destination, integrity)?;
                }
                if file.executable {
                    mark_executable(&destination)?;
                }
                summary.files += 1;
            }
            HeaderEntry::Link(link) => {
                if create_link(archive_path, dest_dir, &rel, &link.link)? {
                    summary.links += 1;
                }
            }
        }
    }

    debug!(
        archive = %archive_path.display(),
        files = summary.files,
        directories = summary.directories,
        links = summary.links,
        "archive extracted"
    );
    Ok(summary)
}

pub(crate) fn unpacked_dir_for(archive_path: &Path) -> PathBuf {
    let mut name = archive_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".unpacked");
    archive_path.with_file_name(name)
}

fn copy_packed_file(
    archive: &mut OpenArchive,
    archive_path: &Path,
    rel: &str,
    file: &FileEntry,
    destination: &Path,
) -> Result<(), ArchiveError> {
    let offset = file
        .offset
        .as_deref()
        .ok_or_else(|| ArchiveError::read(archive_path, format!("entry '{rel}' has no offset")))?
        .parse::<u64>()
        .map_err(|err| {
            ArchiveError::read(archive_path, format!("entry '{rel}' has invalid offset: {err}"))
        })?;

    let start = archive.data_offset.checked_add(offset);
    let end = start.and_then(|start| start.checked_add(file.size));
    let (Some(start), Some(end)) = (start, end) else {
        return Err(ArchiveError::read(
            archive_path,
            format!("entry '{rel}' offset overflows"),
        ));
    };
    if end > archive.len {
        return Err(ArchiveError::read(
            archive_path,
            format!("entry '{rel}' extends past end of archive"),
        ));
    }

    archive
        .file
        .seek(SeekFrom::Start(start))
        .map_err(|err| {
            ArchiveError::read(archive_path, format!("seek failed for '{rel}': {err}"))
        })?;
    let mut output = File::create(destination).map_err(|err| {
        ArchiveError::extract(destination, format!("failed to create file: {err}"))
    })?;
    let copied = io::copy(&mut (&archive.file).take(file.size), &mut output)
        .map_err(|err| ArchiveError::extract(destination, format!("failed to write: {err}")))?;
    if copied != file.size {
        return Err(ArchiveError::read(
            archive_path,
            format!("entry '{rel}' is truncated: expected {} bytes, read {copied}", file.size),
        ));
    }
    Ok(())
}

fn copy_unpacked_file(
    unpacked_root: &Path,
    rel: &str,
    destination: &Path,
) -> Result<(), ArchiveError> {
    let source = unpacked_root.join(rel);
    fs::copy(&source, destination).map_err(|err| {
        ArchiveError::read(
            &source,
            format!("unpacked entry '{rel}' could not be copied: {err}"),
        )
    })?;
    Ok(())
}

fn verify_integrity(
    archive_path: &Path,
    rel: &str,
    destination: &Path,
    expected: &crate::header::IntegrityRecord,
) -> Result<(), ArchiveError> {
    if !expected.algorithm.eq_ignore_ascii_case(INTEGRITY_ALGORITHM) {
        warn!(
            entry = rel,
            algorithm = expected.algorithm.as_str(),
            "unsupported integrity algorithm; skipping verification"
        );
        return Ok(());
    }

    let written = File::open(destination)
        .map_err(|err| ArchiveError::extract(destination, format!("failed to reopen: {err}")))?;
    let actual = file_integrity(BufReader::new(written), expected.block_size)
        .map_err(|err| ArchiveError::extract(destination, format!("failed to hash: {err}")))?;
    if !actual.hash.eq_ignore_ascii_case(&expected.hash) {
        return Err(ArchiveError::read(
            archive_path,
            format!("integrity mismatch for '{rel}'"),
        ));
    }
    if !expected.blocks.is_empty()
        && (actual.blocks.len() != expected.blocks.len()
            || actual
                .blocks
                .iter()
                .zip(&expected.blocks)
                .any(|(left, right)| !left.eq_ignore_ascii_case(right)))
    {
        return Err(ArchiveError::read(
            archive_path,
            format!("block integrity mismatch for '{rel}'"),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(path)
        .map_err(|err| ArchiveError::extract(path, format!("failed to stat: {err}")))?
        .permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions)
        .map_err(|err| ArchiveError::extract(path, format!("failed to chmod: {err}")))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<(), ArchiveError> {
    Ok(())
}

/// Recreates a link entry; returns `false` when the host cannot create it.
fn create_link(
    archive_path: &Path,
    dest_dir: &Path,
    rel: &str,
    target: &str,
) -> Result<bool, ArchiveError> {
    for component in target.split('/') {
        validate_entry_name(component).map_err(|err| {
            ArchiveError::read(archive_path, format!("link '{rel}' has unsafe target: {err}"))
        })?;
    }

    let depth = rel.matches('/').count();
    let relative_target = format!("{}{}", "../".repeat(depth), target);
    let destination = dest_dir.join(rel);
    symlink(&relative_target, &destination)
}

#[cfg(unix)]
fn symlink(target: &str, destination: &Path) -> Result<bool, ArchiveError> {
    std::os::unix::fs::symlink(target, destination).map_err(|err| {
        ArchiveError::extract(destination, format!("failed to create link: {err}"))
    })?;
    Ok(true)
}

#[cfg(not(unix))]
fn symlink(target: &str, destination: &Path) -> Result<bool, ArchiveError> {
    warn!(
        link = %destination.display(),
        target,
        "symbolic links are not recreated on this platform"
    );
    Ok(false)
}
