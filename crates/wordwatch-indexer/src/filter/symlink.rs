use super::AdmissionFilter;
use std::path::Path;

/// Rejects symbolic links, whether they point at files or directories.
pub struct SymlinkFilter;

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

impl AdmissionFilter for SymlinkFilter {
    fn accept_file(&self, path: &Path) -> bool {
        !is_symlink(path)
    }

    fn accept_directory(&self, path: &Path) -> bool {
        !is_symlink(path)
    }

    fn priority(&self) -> u8 {
        0
    }
}
