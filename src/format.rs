use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::ChecksumFormat;
use crate::error::RetrieverError;

pub const ARCHIVE_EXTENSION: &str = "cksum";
pub const MANIFEST_PREFIX: &str = "file_manifest_";
pub const MANIFEST_EXTENSION: &str = "csv";
pub const ARCHIVE_NAME_MARKER: char = '*';

pub const MANIFEST_FALLBACK_PATTERNS: [&str; 3] =
    ["file_manifest_*.csv", "*_manifest_*.csv", "*_MANIFEST.txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Filename,
    Md5,
    Sha1,
}

impl Column {
    pub const ALL: [Column; 3] = [Column::Filename, Column::Md5, Column::Sha1];

    pub fn name(self) -> &'static str {
        match self {
            Column::Filename => "file_name",
            Column::Md5 => "md5",
            Column::Sha1 => "sha1",
        }
    }

    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Column::Filename => &["filename", "file_name", "file", "raw_file", "relative_path"],
            Column::Md5 => &["md5", "md5_hash", "md5sum"],
            Column::Sha1 => &["sha1", "sha1_hash", "sha-1", "sha1sum"],
        }
    }

    fn matches(self, token: &str, options: HeaderOptions) -> bool {
        self.synonyms().iter().any(|synonym| {
            if options.case_sensitive {
                token == *synonym
            } else {
                token.eq_ignore_ascii_case(synonym)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderOptions {
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_require_all_columns")]
    pub require_all_columns: bool,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            require_all_columns: default_require_all_columns(),
        }
    }
}

fn default_require_all_columns() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub filename: usize,
    pub md5: Option<usize>,
    pub sha1: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingColumns {
    pub missing: Vec<Column>,
}

impl MissingColumns {
    pub fn describe(&self) -> String {
        let missing = self
            .missing
            .iter()
            .map(|column| column.name())
            .collect::<Vec<_>>()
            .join(", ");
        let supported = Column::ALL
            .iter()
            .map(|column| format!("{} ({})", column.name(), column.synonyms().join("|")))
            .collect::<Vec<_>>()
            .join("; ");
        format!("missing column(s) {missing}; supported header names: {supported}")
    }
}

pub fn resolve_header(
    line: &str,
    delimiter: char,
    options: HeaderOptions,
) -> Result<ColumnMap, MissingColumns> {
    let tokens = line.split(delimiter).map(str::trim).collect::<Vec<_>>();
    let find = |column: Column| tokens.iter().position(|token| column.matches(token, options));

    let filename = find(Column::Filename);
    let md5 = find(Column::Md5);
    let sha1 = find(Column::Sha1);

    let mut missing = Vec::new();
    if filename.is_none() {
        missing.push(Column::Filename);
    }
    if options.require_all_columns {
        if md5.is_none() {
            missing.push(Column::Md5);
        }
        if sha1.is_none() {
            missing.push(Column::Sha1);
        }
    }

    match filename {
        Some(filename) if missing.is_empty() => Ok(ColumnMap { filename, md5, sha1 }),
        _ => Err(MissingColumns { missing }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedRow {
    pub filename: String,
    pub md5: String,
    pub sha1: String,
}

/// `<sha1>\t*<file>`; `None` when the line has fewer than two fields.
pub fn parse_archive_row(line: &str) -> Option<ParsedRow> {
    let mut fields = line.split('\t');
    let sha1 = fields.next()?.trim();
    let name = fields.next()?.trim();
    let name = name.strip_prefix(ARCHIVE_NAME_MARKER).unwrap_or(name).trim();
    Some(ParsedRow {
        filename: name.to_string(),
        md5: String::new(),
        sha1: sha1.to_string(),
    })
}

pub fn parse_manifest_row(line: &str, delimiter: char, columns: &ColumnMap) -> ParsedRow {
    let fields = line.split(delimiter).map(str::trim).collect::<Vec<_>>();
    let field = |index: Option<usize>| {
        index
            .and_then(|index| fields.get(index))
            .map(|value| value.to_string())
            .unwrap_or_default()
    };
    ParsedRow {
        filename: field(Some(columns.filename)),
        md5: field(columns.md5),
        sha1: field(columns.sha1),
    }
}

pub fn format_archive_row(sha1: &str, relative_path: &str) -> String {
    format!("{sha1}\t{ARCHIVE_NAME_MARKER}{relative_path}")
}

pub fn format_manifest_row(relative_path: &str, md5: &str, sha1: &str, delimiter: char) -> String {
    format!("{relative_path}{delimiter}{md5}{delimiter}{sha1}")
}

impl ChecksumFormat {
    pub fn manifest_path(
        &self,
        target: &Utf8Path,
        base_output: Option<&Utf8Path>,
        date: NaiveDate,
    ) -> Result<Utf8PathBuf, RetrieverError> {
        match self {
            ChecksumFormat::None => Err(RetrieverError::ChecksumDisabled),
            ChecksumFormat::Archive => {
                let parent = parent_of(target)?;
                let name = target.file_name().ok_or_else(|| {
                    RetrieverError::DirectoryResolution(format!("{target} has no directory name"))
                })?;
                Ok(parent.join(format!("{name}.{ARCHIVE_EXTENSION}")))
            }
            ChecksumFormat::Manifest => {
                let dir = match base_output {
                    Some(base) => base.to_path_buf(),
                    None => parent_of(target)?.to_path_buf(),
                };
                Ok(dir.join(manifest_file_name(date)))
            }
        }
    }

    pub fn fallback_patterns(&self, target: &Utf8Path) -> Vec<String> {
        match self {
            ChecksumFormat::None => Vec::new(),
            ChecksumFormat::Archive => match target.file_name() {
                Some(name) => vec![format!("{name}*.{ARCHIVE_EXTENSION}")],
                None => Vec::new(),
            },
            ChecksumFormat::Manifest => MANIFEST_FALLBACK_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
        }
    }

    pub fn delimiter_for(&self, manifest: &Utf8Path) -> char {
        match self {
            ChecksumFormat::Manifest => {
                let is_csv = manifest
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(MANIFEST_EXTENSION));
                if is_csv { ',' } else { '\t' }
            }
            ChecksumFormat::Archive | ChecksumFormat::None => '\t',
        }
    }

    pub fn header(&self, delimiter: char) -> Option<String> {
        match self {
            ChecksumFormat::Manifest => Some(
                Column::ALL
                    .iter()
                    .map(|column| column.name())
                    .collect::<Vec<_>>()
                    .join(delimiter.to_string().as_str()),
            ),
            ChecksumFormat::Archive | ChecksumFormat::None => None,
        }
    }

    pub fn tracks_md5(&self) -> bool {
        matches!(self, ChecksumFormat::Manifest)
    }
}

pub fn manifest_file_name(date: NaiveDate) -> String {
    format!("{MANIFEST_PREFIX}{}.{MANIFEST_EXTENSION}", date.format("%Y%m%d"))
}

/// Accepts `yyyyMMdd` and `yyyy-mm-dd`.
pub fn parse_manifest_date(value: &str) -> Result<NaiveDate, RetrieverError> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|_| RetrieverError::InvalidManifestDate(value.to_string()))
}

fn parent_of(target: &Utf8Path) -> Result<&Utf8Path, RetrieverError> {
    target
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .ok_or_else(|| RetrieverError::DirectoryResolution(format!("{target} has no parent directory")))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn archive_path_is_sibling_of_target() {
        let path = ChecksumFormat::Archive
            .manifest_path(Utf8Path::new("/data/out/QC_Shew"), None, date())
            .unwrap();
        assert_eq!(path, Utf8PathBuf::from("/data/out/QC_Shew.cksum"));
    }

    #[test]
    fn manifest_path_prefers_base_output() {
        let target = Utf8Path::new("/data/out/QC_Shew");
        let with_base = ChecksumFormat::Manifest
            .manifest_path(target, Some(Utf8Path::new("/data/base")), date())
            .unwrap();
        assert_eq!(with_base, Utf8PathBuf::from("/data/base/file_manifest_20240307.csv"));

        let without_base = ChecksumFormat::Manifest.manifest_path(target, None, date()).unwrap();
        assert_eq!(without_base, Utf8PathBuf::from("/data/out/file_manifest_20240307.csv"));
    }

    #[test]
    fn root_target_cannot_resolve() {
        let err = ChecksumFormat::Archive
            .manifest_path(Utf8Path::new("/"), None, date())
            .unwrap_err();
        assert_matches!(err, RetrieverError::DirectoryResolution(_));

        let err = ChecksumFormat::None
            .manifest_path(Utf8Path::new("/data/x"), None, date())
            .unwrap_err();
        assert_matches!(err, RetrieverError::ChecksumDisabled);
    }

    #[test]
    fn delimiter_depends_on_extension() {
        assert_eq!(ChecksumFormat::Manifest.delimiter_for(Utf8Path::new("a/m.CSV")), ',');
        assert_eq!(ChecksumFormat::Manifest.delimiter_for(Utf8Path::new("a/x_MANIFEST.txt")), '\t');
        assert_eq!(ChecksumFormat::Manifest.header(',').as_deref(), Some("file_name,md5,sha1"));
        assert_eq!(ChecksumFormat::Archive.header(','), None);
    }

    #[test]
    fn header_resolution_by_synonym() {
        let columns = resolve_header("SHA1\tRaw_File\tmd5sum", '\t', HeaderOptions::default()).unwrap();
        assert_eq!(columns, ColumnMap { filename: 1, md5: Some(2), sha1: Some(0) });

        let case_sensitive = HeaderOptions { case_sensitive: true, require_all_columns: true };
        assert!(resolve_header("SHA1,Raw_File,md5", ',', case_sensitive).is_err());
    }

    #[test]
    fn header_missing_columns_lists_synonyms() {
        let err = resolve_header("name,size", ',', HeaderOptions::default()).unwrap_err();
        assert_eq!(err.missing, vec![Column::Filename, Column::Md5, Column::Sha1]);
        assert!(err.describe().contains("raw_file"));

        let lenient = HeaderOptions { case_sensitive: false, require_all_columns: false };
        let columns = resolve_header("file_name,sha1", ',', lenient).unwrap();
        assert_eq!(columns.md5, None);
    }

    #[test]
    fn archive_row_strips_marker() {
        let row = parse_archive_row("abc123\t*file1.raw").unwrap();
        assert_eq!(row.filename, "file1.raw");
        assert_eq!(row.sha1, "abc123");
        assert_eq!(parse_archive_row("abc123"), None);
    }

    #[test]
    fn manifest_date_formats() {
        assert_eq!(parse_manifest_date("20240307").unwrap(), date());
        assert_eq!(parse_manifest_date("2024-03-07").unwrap(), date());
        assert_matches!(parse_manifest_date("03/07/2024"), Err(RetrieverError::InvalidManifestDate(_)));
    }
}
