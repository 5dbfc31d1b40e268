use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use regex::{Regex, RegexBuilder};

use crate::error::RetrieverError;

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn normalize_relative(path: &str) -> String {
    let replaced = normalize_separators(path.trim());
    replaced
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

pub fn has_separator(path: &str) -> bool {
    path.contains('/') || path.contains('\\')
}

pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
}

pub fn relative_to(path: &Utf8Path, root: &Utf8Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let joined = relative
        .components()
        .map(|component| component.as_str())
        .collect::<Vec<_>>()
        .join("/");
    (!joined.is_empty()).then_some(joined)
}

#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self, RetrieverError> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');
        let regex = RegexBuilder::new(&expr)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|err| RetrieverError::InvalidPattern(format!("{pattern}: {err}")))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Sorted by file name, descending. A missing directory yields an empty list.
pub fn matching_files(dir: &Utf8Path, pattern: &GlobPattern) -> Result<Vec<Utf8PathBuf>, RetrieverError> {
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(format!("read dir {dir}: {err}")))?;
    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| RetrieverError::Filesystem(err.to_string()))?;
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            continue;
        };
        if !path.as_std_path().is_file() {
            continue;
        }
        if path.file_name().is_some_and(|name| pattern.matches(name)) {
            matches.push(path);
        }
    }
    matches.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(matches)
}

pub fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, RetrieverError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let resolved = std::path::absolute(path.as_std_path())
        .map_err(|err| RetrieverError::Filesystem(format!("resolve {path}: {err}")))?;
    to_utf8(resolved)
}

pub fn to_utf8(path: std::path::PathBuf) -> Result<Utf8PathBuf, RetrieverError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| RetrieverError::Filesystem(format!("non-utf8 path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_relative_paths() {
        assert_eq!(normalize_relative(" Sub\\File.txt "), "Sub/File.txt");
        assert_eq!(normalize_relative("./a//b/"), "a/b");
        assert_eq!(normalize_relative("file1.raw"), "file1.raw");
    }

    #[test]
    fn file_name_handles_both_separators() {
        assert_eq!(file_name_of("a/b\\c.raw"), "c.raw");
        assert_eq!(file_name_of("c.raw"), "c.raw");
    }

    #[test]
    fn relative_to_root() {
        let root = Utf8Path::new("/data/out");
        assert_eq!(
            relative_to(Utf8Path::new("/data/out/ds1/a.raw"), root).as_deref(),
            Some("ds1/a.raw")
        );
        assert_eq!(relative_to(Utf8Path::new("/other/a.raw"), root), None);
        assert_eq!(relative_to(root, root), None);
    }

    #[test]
    fn absolute_paths_are_kept() {
        let path = Utf8Path::new("/data/out/ds1");
        assert_eq!(absolute(path).unwrap(), path);
        let relative = absolute(Utf8Path::new("ds1")).unwrap();
        assert!(relative.is_absolute());
        assert!(relative.ends_with("ds1"));
        assert!(relative.parent().is_some());
    }

    #[test]
    fn glob_matching() {
        let glob = GlobPattern::new("*_MANIFEST.txt", true).unwrap();
        assert!(glob.matches("QC_Shew_manifest.TXT"));
        assert!(!glob.matches("QC_Shew_manifest.txt.bak"));

        let single = GlobPattern::new("ds?.raw", false).unwrap();
        assert!(single.matches("ds1.raw"));
        assert!(!single.matches("ds10.raw"));
        assert!(!GlobPattern::new("a.b", false).unwrap().matches("axb"));
    }
}
