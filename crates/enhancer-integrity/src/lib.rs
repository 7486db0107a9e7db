mod blocks;
mod checksum;

pub use blocks::{file_integrity, FileIntegrity, ASAR_BLOCK_SIZE};
pub use checksum::{sha256_hex, verify_sha256_hex};
