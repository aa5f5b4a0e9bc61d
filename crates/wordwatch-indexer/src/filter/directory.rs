use super::AdmissionFilter;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Rejects anything located under a directory whose name is excluded.
///
/// Only path segments below the watched root are matched, so a root that
/// itself lives under e.g. `/tmp/build` is not rejected wholesale.
pub struct DirectoryNameFilter {
    root: PathBuf,
    exclusions: BTreeSet<String>,
}

impl DirectoryNameFilter {
    pub fn new(root: &Path, exclusions: BTreeSet<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            exclusions,
        }
    }

    fn excluded_segment<'a>(
        &self,
        mut segments: impl Iterator<Item = &'a std::ffi::OsStr>,
    ) -> bool {
        segments.any(|s| s.to_str().is_some_and(|name| self.exclusions.contains(name)))
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

impl AdmissionFilter for DirectoryNameFilter {
    fn accept_file(&self, path: &Path) -> bool {
        let parent = self.relative(path).parent().unwrap_or(Path::new(""));
        !self.excluded_segment(parent.iter())
    }

    fn accept_directory(&self, path: &Path) -> bool {
        !self.excluded_segment(self.relative(path).iter())
    }

    fn priority(&self) -> u8 {
        0
    }

    fn describe(&self) -> Option<String> {
        let names: Vec<&str> = self.exclusions.iter().map(String::as_str).collect();
        Some(format!("excluded dirs - [{}]", names.join(",")))
    }
}
