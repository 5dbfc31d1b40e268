use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RetrieverError {
    #[error("unrecognized checksum format: {0}")]
    #[diagnostic(help("supported formats: none, archive, manifest"))]
    InvalidChecksumFormat(String),

    #[error("checksum generation is disabled for this run")]
    ChecksumDisabled,

    #[error("cannot resolve manifest directory: {0}")]
    DirectoryResolution(String),

    #[error("invalid manifest date (expected yyyyMMdd or yyyy-mm-dd): {0}")]
    InvalidManifestDate(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read input file at {0}")]
    InputRead(PathBuf),

    #[error("invalid input file: {0}")]
    InputParse(String),

    #[error("dataset not found in storage: {0}")]
    DatasetNotFound(String),

    #[error("failed to read manifest {path}: {message}")]
    ManifestRead { path: String, message: String },

    #[error("failed to write manifest {path}: {message}")]
    ManifestWrite { path: String, message: String },

    #[error("failed to hash {path}: {message}")]
    Hashing { path: String, message: String },

    #[error("invalid file pattern: {0}")]
    InvalidPattern(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("{0} dataset(s) or target director(ies) failed")]
    DirectoriesFailed(usize),
}

impl RetrieverError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RetrieverError::InvalidChecksumFormat(_)
                | RetrieverError::ChecksumDisabled
                | RetrieverError::DirectoryResolution(_)
                | RetrieverError::InvalidManifestDate(_)
                | RetrieverError::ConfigRead(_)
                | RetrieverError::ConfigParse(_)
        )
    }
}
