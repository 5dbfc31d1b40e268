use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::checksum_store::MANIFEST_TEMP_PREFIX;
use crate::error::RetrieverError;
use crate::format::{ARCHIVE_EXTENSION, MANIFEST_FALLBACK_PATTERNS};
use crate::fs_util::COPY_TEMP_PREFIX;
use crate::paths::{GlobPattern, to_utf8};

fn skipped_names() -> Vec<String> {
    MANIFEST_FALLBACK_PATTERNS
        .iter()
        .map(|pattern| pattern.to_string())
        .chain([
            format!("*.{ARCHIVE_EXTENSION}"),
            format!("{MANIFEST_TEMP_PREFIX}*"),
            format!("{COPY_TEMP_PREFIX}*"),
        ])
        .collect()
}

pub trait FileDiscovery {
    fn discover(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, RetrieverError>;
}

#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    skip: Vec<GlobPattern>,
}

impl DirectoryWalker {
    pub fn new() -> Result<Self, RetrieverError> {
        let skip = skipped_names()
            .iter()
            .map(|pattern| GlobPattern::new(pattern, true))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { skip })
    }

    fn skipped(&self, name: &str) -> bool {
        self.skip.iter().any(|pattern| pattern.matches(name))
    }
}

impl FileDiscovery for DirectoryWalker {
    fn discover(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, RetrieverError> {
        if !dir.as_std_path().is_dir() {
            return Err(RetrieverError::Filesystem(format!(
                "not a directory: {dir}"
            )));
        }
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(path) = stack.pop() {
            let entries = fs::read_dir(path.as_std_path())
                .map_err(|err| RetrieverError::Filesystem(format!("read dir {path}: {err}")))?;
            for entry in entries {
                let entry = entry.map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
                let path = to_utf8(entry.path())?;
                if path.as_std_path().is_dir() {
                    stack.push(path);
                } else if !path.file_name().is_some_and(|name| self.skipped(name)) {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}
