use super::AdmissionFilter;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Number of leading bytes sniffed for NUL bytes.
const SNIFF_LEN: usize = 1024;

const UTF_BOMS: &[&[u8]] = &[
    &[0xEF, 0xBB, 0xBF],       // UTF-8
    &[0x00, 0x00, 0xFE, 0xFF], // UTF-32 BE
    &[0xFF, 0xFE, 0x00, 0x00], // UTF-32 LE
    &[0xFE, 0xFF],             // UTF-16 BE
    &[0xFF, 0xFE],             // UTF-16 LE
];

/// Rejects files whose first kilobyte contains a NUL byte, unless the file
/// starts with a Unicode byte order mark.
pub struct BinaryFileFilter;

impl BinaryFileFilter {
    fn looks_textual(bytes: &[u8]) -> bool {
        UTF_BOMS.iter().any(|bom| bytes.starts_with(bom)) || !bytes.contains(&0)
    }
}

impl AdmissionFilter for BinaryFileFilter {
    fn accept_file(&self, path: &Path) -> bool {
        let mut buffer = Vec::with_capacity(SNIFF_LEN);
        let read = File::open(path)
            .and_then(|file| file.take(SNIFF_LEN as u64).read_to_end(&mut buffer));
        match read {
            Ok(_) => Self::looks_textual(&buffer),
            Err(e) => {
                // Most likely deleted in the meantime; the indexer will drop it
                debug!(path = ?path, error = %e, "Could not sniff file, assuming text");
                true
            }
        }
    }

    fn accept_directory(&self, _path: &Path) -> bool {
        true
    }

    fn priority(&self) -> u8 {
        2
    }
}
