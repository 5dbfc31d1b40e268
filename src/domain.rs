use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RetrieverError;
use crate::paths::normalize_relative;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumFormat {
    None,
    Archive,
    #[default]
    Manifest,
}

impl fmt::Display for ChecksumFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumFormat::None => write!(f, "none"),
            ChecksumFormat::Archive => write!(f, "archive"),
            ChecksumFormat::Manifest => write!(f, "manifest"),
        }
    }
}

impl FromStr for ChecksumFormat {
    type Err = RetrieverError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(ChecksumFormat::None),
            "archive" | "cksum" | "a" => Ok(ChecksumFormat::Archive),
            "manifest" | "csv" | "b" => Ok(ChecksumFormat::Manifest),
            _ => Err(RetrieverError::InvalidChecksumFormat(value.to_string())),
        }
    }
}

/// Lookup key of a manifest row: `/` separators, case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(String);

impl PathKey {
    pub fn new(relative_path: &str) -> Self {
        Self(normalize_relative(relative_path).to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    relative_path: String,
    key: PathKey,
    full_path: Option<Utf8PathBuf>,
    pub md5: String,
    pub md5_base64: String,
    pub sha1: String,
}

impl ChecksumRecord {
    pub fn new(relative_path: &str) -> Self {
        let relative_path = normalize_relative(relative_path);
        let key = PathKey::new(&relative_path);
        Self {
            relative_path,
            key,
            full_path: None,
            md5: String::new(),
            md5_base64: String::new(),
            sha1: String::new(),
        }
    }

    pub fn with_digests(relative_path: &str, md5: &str, sha1: &str) -> Self {
        let mut record = Self::new(relative_path);
        record.md5 = md5.trim().to_string();
        record.md5_base64 = md5_hex_to_base64(&record.md5).unwrap_or_default();
        record.sha1 = sha1.trim().to_string();
        record
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn key(&self) -> &PathKey {
        &self.key
    }

    pub fn full_path(&self) -> Option<&Utf8PathBuf> {
        self.full_path.as_ref()
    }

    pub fn set_full_path(&mut self, path: Utf8PathBuf) {
        self.full_path = Some(path);
    }

    pub fn clear_digests(&mut self) {
        self.md5.clear();
        self.md5_base64.clear();
        self.sha1.clear();
    }
}

pub fn md5_hex_to_base64(md5_hex: &str) -> Option<String> {
    let bytes = hex::decode(md5_hex.trim()).ok()?;
    (bytes.len() == 16).then(|| BASE64.encode(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    #[default]
    Copy,
    Link,
}

impl fmt::Display for CopyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyMode::Copy => write!(f, "copy"),
            CopyMode::Link => write!(f, "link"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_checksum_format() {
        assert_eq!("Manifest".parse::<ChecksumFormat>().unwrap(), ChecksumFormat::Manifest);
        assert_eq!("cksum".parse::<ChecksumFormat>().unwrap(), ChecksumFormat::Archive);
        assert_eq!("none".parse::<ChecksumFormat>().unwrap(), ChecksumFormat::None);
        let err = "sha256".parse::<ChecksumFormat>().unwrap_err();
        assert_matches!(err, RetrieverError::InvalidChecksumFormat(_));
    }

    #[test]
    fn keys_ignore_case_and_separators() {
        assert_eq!(PathKey::new("Sub\\File.txt"), PathKey::new("sub/file.txt"));
        assert_ne!(PathKey::new("sub/file.txt"), PathKey::new("file.txt"));
    }

    #[test]
    fn record_keeps_display_case() {
        let record = ChecksumRecord::new("Sub\\File.TXT");
        assert_eq!(record.relative_path(), "Sub/File.TXT");
        assert_eq!(record.key().as_str(), "sub/file.txt");
    }

    #[test]
    fn md5_base64_derived_from_hex() {
        let record = ChecksumRecord::with_digests("a.raw", "d41d8cd98f00b204e9800998ecf8427e", "");
        assert_eq!(record.md5_base64, "1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(ChecksumRecord::with_digests("b.raw", "not-hex", "").md5_base64, "");
        assert_eq!(md5_hex_to_base64("abcd"), None);
    }
}
