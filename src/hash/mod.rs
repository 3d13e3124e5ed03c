//! Content hashing for build caching
//!
//! Tree IDs identify the state of a whole source tree and key full-build
//! archives. Per-file digests feed the build-cache keys.
//!
//! # Mode policy
//!
//! Only the executable bit of a file's mode is hashed (the same
//! granularity Git tracks). Timestamps are never hashed, so `touch`
//! leaves a Tree ID unchanged while `chmod +x` changes it.

mod tree;

pub use tree::{ContentHasher, TreeOptions, BUILD_VERSION};

use crate::error::{PlatformError, PlatformResult};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// SHA-256 of a file's contents, hex encoded
pub fn hash_file(path: &Path) -> PlatformResult<String> {
    let mut file = File::open(path)
        .map_err(|e| PlatformError::io(format!("reading {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| PlatformError::io(format!("hashing {}", path.display()), e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a byte string, hex encoded
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Git-style mode string: `100755` for executables, `100644` otherwise
pub fn file_mode(path: &Path) -> PlatformResult<&'static str> {
    let meta = fs::metadata(path)
        .map_err(|e| PlatformError::io(format!("reading metadata of {}", path.display()), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return Ok("100755");
        }
    }
    #[cfg(not(unix))]
    let _ = meta;
    Ok("100644")
}
