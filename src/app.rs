use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::checksum_store::{ChecksumStore, StoreOptions};
use crate::config::ResolvedConfig;
use crate::discovery::FileDiscovery;
use crate::domain::ChecksumFormat;
use crate::error::RetrieverError;
use crate::fs_util::{Placement, place_file, renamed};
use crate::hasher::HashComputer;
use crate::input::InputRow;
use crate::paths::{GlobPattern, absolute, file_name_of, normalize_relative, relative_to};
use crate::report::{Diagnostics, Message};
use crate::source::{DatasetLocation, DatasetSource};

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub datasets: Vec<DatasetResult>,
    pub directories: Vec<DirectoryResult>,
    pub messages: Vec<Message>,
    pub failed_datasets: usize,
    pub failed_directories: usize,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetResult {
    pub dataset: String,
    pub target_directory: String,
    pub copied: usize,
    pub linked: usize,
    pub skipped: usize,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DirectoryResult {
    pub directory: String,
    pub manifest: Option<String>,
    pub loaded_rows: usize,
    pub hashed: usize,
    pub missing: usize,
    pub hash_failures: usize,
    pub rows_written: usize,
    pub written: bool,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
    pub percent: Option<f64>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFiles {
    pub directory: Utf8PathBuf,
    pub files: Vec<Utf8PathBuf>,
}

pub struct App<S: DatasetSource, H: HashComputer, D: FileDiscovery> {
    config: ResolvedConfig,
    source: S,
    hasher: H,
    discovery: D,
}

impl<S: DatasetSource, H: HashComputer, D: FileDiscovery> App<S, H, D> {
    pub fn new(config: ResolvedConfig, source: S, hasher: H, discovery: D) -> Self {
        Self {
            config,
            source,
            hasher,
            discovery,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn retrieve(
        &self,
        rows: &[InputRow],
        output_root: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> RunResult {
        let mut diagnostics = Diagnostics::new();
        let mut datasets = Vec::new();
        let mut targets: Vec<TargetFiles> = Vec::new();
        let output_root = absolute(output_root).unwrap_or_else(|_| output_root.to_path_buf());
        let mut options = self.config.store_options();
        if options.base_output.is_none() {
            options.base_output = Some(output_root.clone());
        }

        for row in rows {
            let target_dir = match row.target_directory.as_deref() {
                Some(sub) => output_root.join(normalize_relative(sub)),
                None => output_root.to_path_buf(),
            };
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; dataset {}", row.dataset),
                elapsed: None,
                percent: None,
            });
            match self.place_dataset(row, &target_dir, &mut diagnostics) {
                Ok((result, placed)) => {
                    datasets.push(result);
                    add_target_files(&mut targets, &target_dir, placed);
                }
                Err(err) => {
                    diagnostics.error(format!("dataset {} (line {}): {err}", row.dataset, row.line));
                    datasets.push(DatasetResult {
                        dataset: row.dataset.clone(),
                        target_directory: target_dir.to_string(),
                        copied: 0,
                        linked: 0,
                        skipped: 0,
                        success: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let directories = self.update_checksums(&targets, &options, sink, &mut diagnostics);
        finish(datasets, directories, diagnostics)
    }

    pub fn checksum_directories(&self, dirs: &[Utf8PathBuf], sink: &dyn ProgressSink) -> RunResult {
        let mut diagnostics = Diagnostics::new();
        let mut targets = Vec::new();
        let mut failed = Vec::new();
        for dir in dirs {
            let dir = absolute(dir).unwrap_or_else(|_| dir.clone());
            match self.discovery.discover(&dir) {
                Ok(files) => add_target_files(&mut targets, &dir, files),
                Err(err) => {
                    diagnostics.error(format!("{dir}: {err}"));
                    failed.push(DirectoryResult {
                        directory: dir.to_string(),
                        error: Some(err.to_string()),
                        ..DirectoryResult::default()
                    });
                }
            }
        }
        let options = self.config.store_options();
        let mut directories = self.update_checksums(&targets, &options, sink, &mut diagnostics);
        directories.extend(failed);
        finish(Vec::new(), directories, diagnostics)
    }

    pub fn update_checksums(
        &self,
        targets: &[TargetFiles],
        options: &StoreOptions,
        sink: &dyn ProgressSink,
        diagnostics: &mut Diagnostics,
    ) -> Vec<DirectoryResult> {
        if self.config.checksum_format == ChecksumFormat::None {
            diagnostics.status("checksum format is none; skipping checksum files");
            return Vec::new();
        }
        targets
            .iter()
            .map(|target| self.update_directory(target, options, sink, diagnostics))
            .collect()
    }

    pub fn update_directory(
        &self,
        target: &TargetFiles,
        options: &StoreOptions,
        sink: &dyn ProgressSink,
        diagnostics: &mut Diagnostics,
    ) -> DirectoryResult {
        let mut result = DirectoryResult {
            directory: target.directory.to_string(),
            ..DirectoryResult::default()
        };

        let mut store = match ChecksumStore::new(
            target.directory.clone(),
            self.config.checksum_format,
            options.clone(),
        ) {
            Ok(store) => store,
            Err(err) => {
                diagnostics.error(format!("{}: {err}", target.directory));
                result.error = Some(err.to_string());
                return result;
            }
        };
        result.manifest = store.manifest_path().map(|path| path.to_string());
        for file in &target.files {
            store.queue_file(file.clone());
        }

        sink.event(ProgressEvent {
            message: format!("phase=Load; {}", target.directory),
            elapsed: None,
            percent: None,
        });
        match store.load() {
            Ok(outcome) => result.loaded_rows = outcome.records,
            Err(err) => {
                result.error = Some(err.to_string());
                let mut store_diagnostics = store.into_diagnostics();
                if !store_diagnostics.has_errors() {
                    store_diagnostics.error(format!("{}: {err}", target.directory));
                }
                diagnostics.merge(store_diagnostics);
                return result;
            }
        }

        let summary = store.compute_missing(&self.hasher, sink, self.config.hash_options());
        result.hashed = summary.hashed;
        result.missing = summary.missing;
        result.hash_failures = summary.failed;

        sink.event(ProgressEvent {
            message: format!("phase=Write; {}", target.directory),
            elapsed: None,
            percent: None,
        });
        match store.write() {
            Ok(outcome) => {
                result.rows_written = outcome.rows;
                result.written = outcome.written;
                result.success = true;
            }
            Err(err) => result.error = Some(err.to_string()),
        }
        diagnostics.merge(store.into_diagnostics());
        result
    }

    fn place_dataset(
        &self,
        row: &InputRow,
        target_dir: &Utf8Path,
        diagnostics: &mut Diagnostics,
    ) -> Result<(DatasetResult, Vec<Utf8PathBuf>), RetrieverError> {
        let location = self
            .source
            .resolve(&row.dataset)?
            .ok_or_else(|| RetrieverError::DatasetNotFound(row.dataset.clone()))?;
        let pattern = GlobPattern::new(&row.file_pattern, true)?;

        let candidates = match location {
            DatasetLocation::Directory(dir) => self
                .discovery
                .discover(&dir)?
                .into_iter()
                .filter_map(|file| relative_to(&file, &dir).map(|relative| (file, relative)))
                .collect::<Vec<_>>(),
            DatasetLocation::Files(files) => files
                .into_iter()
                .filter_map(|file| {
                    let name = file.file_name()?.to_string();
                    Some((file, name))
                })
                .collect(),
        };

        let mut result = DatasetResult {
            dataset: row.dataset.clone(),
            target_directory: target_dir.to_string(),
            copied: 0,
            linked: 0,
            skipped: 0,
            success: true,
            error: None,
        };
        let mut placed = Vec::new();
        for (source, relative) in candidates {
            if !pattern.matches(file_name_of(&relative)) {
                continue;
            }
            let dest = target_dir.join(renamed(&relative, &row.dataset, row.new_name.as_deref()));
            if self.config.preview {
                diagnostics.status(format!(
                    "preview: would {} {source} to {dest}",
                    self.config.copy_mode
                ));
                placed.push(dest);
                continue;
            }
            match place_file(&source, &dest, self.config.copy_mode, self.config.overwrite)? {
                Placement::Copied => result.copied += 1,
                Placement::Linked => result.linked += 1,
                Placement::Skipped => {
                    diagnostics.debug(format!("{dest} already present, not replaced"));
                    result.skipped += 1;
                }
            }
            placed.push(dest);
        }

        if placed.is_empty() {
            diagnostics.warning(format!(
                "dataset {}: no files matched {}",
                row.dataset, row.file_pattern
            ));
        } else {
            diagnostics.debug(format!(
                "dataset {}: {} file(s) in {target_dir}",
                row.dataset,
                placed.len()
            ));
        }
        Ok((result, placed))
    }
}

fn add_target_files(targets: &mut Vec<TargetFiles>, dir: &Utf8Path, files: Vec<Utf8PathBuf>) {
    let idx = match targets.iter().position(|target| target.directory.as_path() == dir) {
        Some(idx) => idx,
        None => {
            targets.push(TargetFiles {
                directory: dir.to_path_buf(),
                files: Vec::new(),
            });
            targets.len() - 1
        }
    };
    let entry = &mut targets[idx];
    for file in files {
        if !entry.files.contains(&file) {
            entry.files.push(file);
        }
    }
}

fn finish(
    datasets: Vec<DatasetResult>,
    directories: Vec<DirectoryResult>,
    diagnostics: Diagnostics,
) -> RunResult {
    let failed_datasets = datasets.iter().filter(|item| !item.success).count();
    let failed_directories = directories.iter().filter(|item| !item.success).count();
    RunResult {
        datasets,
        directories,
        messages: diagnostics.messages(),
        failed_datasets,
        failed_directories,
        success: failed_datasets == 0 && failed_directories == 0,
    }
}
