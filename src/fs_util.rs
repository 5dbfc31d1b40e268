use std::fs;

use camino::Utf8Path;

use crate::domain::CopyMode;
use crate::error::RetrieverError;

pub const COPY_TEMP_PREFIX: &str = ".dataset-retriever";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Copied,
    Linked,
    Skipped,
}

pub fn place_file(
    source: &Utf8Path,
    dest: &Utf8Path,
    mode: CopyMode,
    overwrite: bool,
) -> Result<Placement, RetrieverError> {
    if !overwrite && same_length(source, dest) {
        return Ok(Placement::Skipped);
    }
    match mode {
        CopyMode::Copy => {
            copy_file_atomic(source, dest)?;
            Ok(Placement::Copied)
        }
        CopyMode::Link => {
            link_file(source, dest)?;
            Ok(Placement::Linked)
        }
    }
}

pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), RetrieverError> {
    let parent = dest
        .parent()
        .ok_or_else(|| RetrieverError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(format!("create {parent}: {err}")))?;
    let temp = tempfile::Builder::new()
        .prefix(COPY_TEMP_PREFIX)
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
    fs::copy(source.as_std_path(), temp.path())
        .map_err(|err| RetrieverError::Filesystem(format!("copy {source}: {err}")))?;
    temp.persist(dest.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(format!("persist {dest}: {}", err.error)))?;
    Ok(())
}

pub fn link_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), RetrieverError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| RetrieverError::Filesystem(format!("create {parent}: {err}")))?;
    }
    if dest.as_std_path().exists() {
        fs::remove_file(dest.as_std_path())
            .map_err(|err| RetrieverError::Filesystem(format!("remove {dest}: {err}")))?;
    }
    fs::hard_link(source.as_std_path(), dest.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(format!("link {source} -> {dest}: {err}")))
}

fn same_length(source: &Utf8Path, dest: &Utf8Path) -> bool {
    match (fs::metadata(source.as_std_path()), fs::metadata(dest.as_std_path())) {
        (Ok(src), Ok(dst)) => dst.is_file() && src.len() == dst.len(),
        _ => false,
    }
}

/// Applies a dataset rename to the last segment of `relative`: a leading dataset
/// name (any case) is replaced by `new_name`.
pub fn renamed(relative: &str, dataset: &str, new_name: Option<&str>) -> String {
    let Some(new_name) = new_name.filter(|name| !name.is_empty()) else {
        return relative.to_string();
    };
    let (dir, name) = match relative.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, relative),
    };
    let replaced = match name.get(..dataset.len()) {
        Some(prefix) if !dataset.is_empty() && prefix.eq_ignore_ascii_case(dataset) => {
            format!("{new_name}{}", &name[dataset.len()..])
        }
        _ => name.to_string(),
    };
    match dir {
        Some(dir) => format!("{dir}/{replaced}"),
        None => replaced,
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn rename_replaces_dataset_prefix() {
        assert_eq!(renamed("QC_Shew_01.raw", "QC_Shew_01", Some("QC_A")), "QC_A.raw");
        assert_eq!(renamed("sub/qc_shew_01_x.mzML", "QC_Shew_01", Some("QC_A")), "sub/QC_A_x.mzML");
        assert_eq!(renamed("other.raw", "QC_Shew_01", Some("QC_A")), "other.raw");
        assert_eq!(renamed("QC_Shew_01.raw", "QC_Shew_01", None), "QC_Shew_01.raw");
    }

    #[test]
    fn copy_skips_same_length_target() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let source = root.join("src.raw");
        let dest = root.join("out/dst.raw");
        fs::write(&source, b"abc").unwrap();

        assert_eq!(place_file(&source, &dest, CopyMode::Copy, false).unwrap(), Placement::Copied);
        assert_eq!(fs::read(&dest).unwrap(), b"abc");
        assert_eq!(place_file(&source, &dest, CopyMode::Copy, false).unwrap(), Placement::Skipped);
        assert_eq!(place_file(&source, &dest, CopyMode::Link, true).unwrap(), Placement::Linked);
        assert_eq!(fs::read(&dest).unwrap(), b"abc");
    }
}
