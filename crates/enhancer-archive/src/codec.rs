use std::path::Path;

use crate::error::ArchiveError;
use crate::reader::extract_archive;
use crate::writer::pack_directory;

/// Unpacks and re-packs the working archive; the pipeline only talks to this.
pub trait ArchiveCodec {
    /// Replaces `dest_dir` with the archive's tree.
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError>;

    /// Serializes `src_dir` into `archive_path`, overwriting it.
    fn repack(&self, src_dir: &Path, archive_path: &Path) -> Result<(), ArchiveError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsarCodec;

impl ArchiveCodec for AsarCodec {
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
        extract_archive(archive_path, dest_dir).map(|_| ())
    }

    fn repack(&self, src_dir: &Path, archive_path: &Path) -> Result<(), ArchiveError> {
        pack_directory(src_dir, archive_path).map(|_| ())
    }
}
