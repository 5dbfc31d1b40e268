use camino::{Utf8Path, Utf8PathBuf};

use crate::error::RetrieverError;
use crate::paths::{GlobPattern, has_separator, matching_files};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetLocation {
    Directory(Utf8PathBuf),
    Files(Vec<Utf8PathBuf>),
}

pub trait DatasetSource: Send + Sync {
    fn resolve(&self, dataset: &str) -> Result<Option<DatasetLocation>, RetrieverError>;
}

#[derive(Debug, Clone)]
pub struct LocalStorageSource {
    roots: Vec<Utf8PathBuf>,
}

impl LocalStorageSource {
    pub fn new(roots: Vec<Utf8PathBuf>) -> Self {
        Self { roots }
    }

    fn resolve_in(
        root: &Utf8Path,
        dataset: &str,
    ) -> Result<Option<DatasetLocation>, RetrieverError> {
        let dir = root.join(dataset);
        if dir.as_std_path().is_dir() {
            return Ok(Some(DatasetLocation::Directory(dir)));
        }
        let pattern = GlobPattern::new(&format!("{dataset}.*"), true)?;
        let mut files = matching_files(root, &pattern)?;
        if files.is_empty() {
            return Ok(None);
        }
        files.sort();
        Ok(Some(DatasetLocation::Files(files)))
    }
}

impl DatasetSource for LocalStorageSource {
    fn resolve(&self, dataset: &str) -> Result<Option<DatasetLocation>, RetrieverError> {
        let dataset = dataset.trim();
        if dataset.is_empty() || dataset == ".." || has_separator(dataset) {
            return Err(RetrieverError::InputParse(format!(
                "invalid dataset name: {dataset:?}"
            )));
        }
        for root in &self.roots {
            if let Some(location) = Self::resolve_in(root, dataset)? {
                return Ok(Some(location));
            }
        }
        Ok(None)
    }
}
