use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use sha1::{Digest, Sha1};

/// Files are streamed through the hasher in blocks of this size.
const BLOCK_SIZE: usize = 65536;

/// A 20-byte SHA-1 digest used to fingerprint file artifacts.
///
/// Two artifacts pointing at the same location compare equal only if their
/// digests match, so a changed file invalidates every task that received it
/// as an explicit input.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash20([u8; 20]);

impl<T> From<T> for Hash20
where
    T: Into<[u8; 20]>,
{
    fn from(value: T) -> Self {
        Hash20(value.into())
    }
}

impl Hash20 {
    pub(crate) fn hash_file(path: &Utf8Path) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let mut hasher = Sha1::new();
        let mut block = vec![0u8; BLOCK_SIZE];

        loop {
            let read = file.read(&mut block)?;
            if read == 0 {
                break;
            }
            hasher.update(&block[..read]);
        }

        Ok(hasher.finalize().into())
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(40);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash20 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash20({})", self.to_hex())
    }
}
