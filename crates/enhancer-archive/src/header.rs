use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

/// Headers larger than this are treated as corrupt rather than allocated.
const MAX_HEADER_LEN: usize = 256 * 1024 * 1024;

pub(crate) const INTEGRITY_ALGORITHM: &str = "SHA256";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ArchiveHeader {
    pub(crate) files: BTreeMap<String, HeaderEntry>,
}

// Variant order matters for untagged matching: a file never carries `files`
// or `link`, so it is tried last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum HeaderEntry {
    Directory(DirectoryEntry),
    Link(LinkEntry),
    File(FileEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DirectoryEntry {
    pub(crate) files: BTreeMap<String, HeaderEntry>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub(crate) unpacked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LinkEntry {
    pub(crate) link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct FileEntry {
    pub(crate) size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) offset: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub(crate) executable: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub(crate) unpacked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) integrity: Option<IntegrityRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IntegrityRecord {
    pub(crate) algorithm: String,
    pub(crate) hash: String,
    #[serde(rename = "blockSize")]
    pub(crate) block_size: usize,
    pub(crate) blocks: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Decoded header plus the absolute offset where file data begins.
pub(crate) struct DecodedHeader {
    pub(crate) header: ArchiveHeader,
    pub(crate) data_offset: u64,
}

pub(crate) fn read_header<R: Read>(reader: &mut R) -> Result<DecodedHeader, String> {
    let mut size_pickle = [0_u8; 8];
    reader
        .read_exact(&mut size_pickle)
        .map_err(|err| format!("truncated size pickle: {err}"))?;

    let size_payload_len = read_u32(&size_pickle[0..4]);
    if size_payload_len < 4 {
        return Err(format!(
            "invalid size pickle payload length {size_payload_len}"
        ));
    }
    let header_len = read_u32(&size_pickle[4..8]) as usize;
    if !(8..=MAX_HEADER_LEN).contains(&header_len) {
        return Err(format!("invalid header length {header_len}"));
    }

    let mut header_pickle = vec![0_u8; header_len];
    reader
        .read_exact(&mut header_pickle)
        .map_err(|err| format!("truncated header pickle: {err}"))?;

    let json_len = i32::from_le_bytes([
        header_pickle[4],
        header_pickle[5],
        header_pickle[6],
        header_pickle[7],
    ]);
    let json_len = usize::try_from(json_len)
        .map_err(|_| format!("negative header string length {json_len}"))?;
    let json_end = 8_usize
        .checked_add(json_len)
        .filter(|end| *end <= header_len)
        .ok_or_else(|| {
            format!("header string length {json_len} exceeds header pickle of {header_len} bytes")
        })?;

    let header: ArchiveHeader = serde_json::from_slice(&header_pickle[8..json_end])
        .map_err(|err| format!("invalid header JSON: {err}"))?;

    Ok(DecodedHeader {
        header,
        data_offset: 8 + header_len as u64,
    })
}

pub(crate) fn encode_header(header: &ArchiveHeader) -> Result<Vec<u8>, String> {
    let json = serde_json::to_vec(header).map_err(|err| format!("header JSON: {err}"))?;
    let json_len =
        u32::try_from(json.len()).map_err(|_| "header JSON exceeds 4 GiB".to_string())?;
    let padded_len = json.len().next_multiple_of(4);
    let header_payload_len = 4 + padded_len;
    let header_len = 4 + header_payload_len;
    if header_len > MAX_HEADER_LEN {
        return Err(format!("header of {header_len} bytes is too large"));
    }

    let mut encoded = Vec::with_capacity(8 + header_len);
    encoded.extend_from_slice(&4_u32.to_le_bytes());
    encoded.extend_from_slice(&(header_len as u32).to_le_bytes());
    encoded.extend_from_slice(&(header_payload_len as u32).to_le_bytes());
    encoded.extend_from_slice(&json_len.to_le_bytes());
    encoded.extend_from_slice(&json);
    encoded.resize(8 + header_len, 0);
    Ok(encoded)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0_u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Entry names must be single normal path components.
pub(crate) fn validate_entry_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(format!("invalid entry name '{name}'"));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(format!("entry name '{name}' contains a path separator"));
    }
    Ok(())
}
