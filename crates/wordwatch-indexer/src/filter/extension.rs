use super::AdmissionFilter;
use std::collections::BTreeSet;
use std::path::Path;

/// Only admits files whose extension is in the allow-list.
pub struct FileExtensionFilter {
    extensions: BTreeSet<String>,
}

impl FileExtensionFilter {
    pub fn new(extensions: BTreeSet<String>) -> Self {
        Self { extensions }
    }
}

impl AdmissionFilter for FileExtensionFilter {
    fn accept_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(e))
    }

    fn accept_directory(&self, _path: &Path) -> bool {
        true
    }

    fn priority(&self) -> u8 {
        0
    }

    fn describe(&self) -> Option<String> {
        let exts: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        Some(format!("file extensions - [{}]", exts.join(",")))
    }
}
