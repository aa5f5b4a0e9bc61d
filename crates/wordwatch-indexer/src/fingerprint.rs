//! Content fingerprints.
//!
//! A fingerprint identifies file *content*, not a file: every path whose
//! bytes hash to the same digest shares one fingerprint and one set of
//! word index rows.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// SHA256 digest of a file's bytes, or [`Fingerprint::EMPTY`] when the
/// file could not be read.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Sentinel for unreadable or vanished files.
    pub const EMPTY: Fingerprint = Fingerprint([0; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Fingerprint(bytes)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("EMPTY");
        }
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell fingerprints apart in logs
        let full = self.to_string();
        write!(f, "Fingerprint({})", &full[..full.len().min(12)])
    }
}

/// Computes fingerprints of file content.
pub trait ContentFingerprinter: Send + Sync {
    /// Fingerprint of the bytes currently stored at `path`.
    /// Returns [`Fingerprint::EMPTY`] on any read failure.
    fn fingerprint(&self, path: &Path) -> Fingerprint;

    /// Fingerprint of bytes already in memory.
    fn digest(&self, bytes: &[u8]) -> Fingerprint;
}

/// Streaming SHA256 fingerprinter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Fingerprinter;

impl Sha256Fingerprinter {
    fn hash_file(path: &Path) -> io::Result<Fingerprint> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(Fingerprint(hasher.finalize().into()))
    }
}

impl ContentFingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, path: &Path) -> Fingerprint {
        match Self::hash_file(path) {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                debug!(path = ?path, error = %e, "Unable to fingerprint file");
                Fingerprint::EMPTY
            }
        }
    }

    fn digest(&self, bytes: &[u8]) -> Fingerprint {
        Fingerprint(Sha256::digest(bytes).into())
    }
}
