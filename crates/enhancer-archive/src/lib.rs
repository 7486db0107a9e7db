//! Reader and writer for the asar resource archives Electron applications
//! load at startup.
//!
//! An archive is an 8-byte size pickle, a JSON header pickle describing the
//! directory tree, then the concatenated file contents. Files flagged
//! `unpacked` live next to the archive in `<archive>.unpacked/`.

mod codec;
mod error;
mod header;
mod reader;
mod writer;

pub use codec::{ArchiveCodec, AsarCodec};
pub use error::ArchiveError;
pub use reader::{extract_archive, list_files, ArchivedFile, ExtractSummary};
pub use writer::{pack_directory, PackSummary};
