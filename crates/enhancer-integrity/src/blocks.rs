use std::io::{self, Read};

use sha2::{Digest, Sha256};

/// Block size the asar format uses for per-block integrity hashes.
pub const ASAR_BLOCK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIntegrity {
    pub hash: String,
    pub block_size: usize,
    pub blocks: Vec<String>,
}

/// Hashes a stream as a whole and in `block_size` chunks.
///
/// The final chunk may be short or empty; an empty stream yields a single
/// digest of the empty block.
pub fn file_integrity<R: Read>(mut reader: R, block_size: usize) -> io::Result<FileIntegrity> {
    if block_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "integrity block size must be greater than zero",
        ));
    }

    let mut whole = Sha256::new();
    let mut blocks = Vec::new();
    let mut buffer = vec![0_u8; block_size];

    loop {
        let filled = fill_block(&mut reader, &mut buffer)?;
        if filled == 0 {
            if blocks.is_empty() {
                blocks.push(hex::encode(Sha256::digest(b"")));
            }
            break;
        }

        whole.update(&buffer[..filled]);
        blocks.push(hex::encode(Sha256::digest(&buffer[..filled])));
        if filled < block_size {
            break;
        }
    }

    Ok(FileIntegrity {
        hash: hex::encode(whole.finalize()),
        block_size,
        blocks,
    })
}

fn fill_block<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sha256_hex;

    #[test]
    fn empty_stream_has_single_empty_block() {
        let integrity = file_integrity(&b""[..], 4).expect("must hash");
        assert_eq!(integrity.hash, sha256_hex(b""));
        assert_eq!(integrity.blocks, vec![sha256_hex(b"")]);
    }

    #[test]
    fn stream_is_split_into_fixed_blocks() {
        let integrity = file_integrity(&b"abcdefghij"[..], 4).expect("must hash");
        assert_eq!(integrity.hash, sha256_hex(b"abcdefghij"));
        assert_eq!(
            integrity.blocks,
            vec![sha256_hex(b"abcd"), sha256_hex(b"efgh"), sha256_hex(b"ij")]
        );
    }

    #[test]
    fn exact_multiple_does_not_emit_trailing_empty_block() {
        let integrity = file_integrity(&b"abcdefgh"[..], 4).expect("must hash");
        assert_eq!(
            integrity.blocks,
            vec![sha256_hex(b"abcd"), sha256_hex(b"efgh")]
        );
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert!(file_integrity(&b"abc"[..], 0).is_err());
    }
}
