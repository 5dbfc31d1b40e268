use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{ChecksumFormat, ChecksumRecord, PathKey, md5_hex_to_base64};
use crate::error::RetrieverError;
use crate::format::{
    HeaderOptions, format_archive_row, format_manifest_row, parse_archive_row, parse_manifest_row,
    resolve_header,
};
use crate::hasher::{DigestRequest, HashComputer};
use crate::paths::{GlobPattern, absolute, has_separator, matching_files, relative_to};
use crate::report::Diagnostics;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);
pub const MANIFEST_TEMP_PREFIX: &str = ".checksum-manifest";

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub base_output: Option<Utf8PathBuf>,
    pub manifest_date: Option<NaiveDate>,
    pub header: HeaderOptions,
    pub preview: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct HashOptions {
    pub force: bool,
    pub progress_interval: Duration,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            force: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub source: Option<Utf8PathBuf>,
    pub records: usize,
    pub duplicates: usize,
    pub repaired: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HashSummary {
    pub hashed: usize,
    pub missing: usize,
    pub failed: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub path: Option<Utf8PathBuf>,
    pub rows: usize,
    pub written: bool,
}

#[derive(Debug)]
pub struct ChecksumStore {
    target_dir: Utf8PathBuf,
    format: ChecksumFormat,
    options: StoreOptions,
    manifest_path: Option<Utf8PathBuf>,
    resolution_error: Option<String>,
    queued: Vec<Utf8PathBuf>,
    collisions: Vec<Utf8PathBuf>,
    records: Vec<ChecksumRecord>,
    index: HashMap<PathKey, usize>,
    loaded: bool,
    diagnostics: Diagnostics,
}

struct PendingHash {
    record: usize,
    path: Utf8PathBuf,
    request: DigestRequest,
}

impl ChecksumStore {
    pub fn new(
        target_dir: Utf8PathBuf,
        format: ChecksumFormat,
        options: StoreOptions,
    ) -> Result<Self, RetrieverError> {
        if format == ChecksumFormat::None {
            return Err(RetrieverError::ChecksumDisabled);
        }
        let target_dir = absolute(&target_dir)?;
        let options = StoreOptions {
            base_output: options.base_output.as_deref().map(absolute).transpose()?,
            ..options
        };
        let date = options
            .manifest_date
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let (manifest_path, resolution_error) =
            match format.manifest_path(&target_dir, options.base_output.as_deref(), date) {
                Ok(path) => (Some(path), None),
                Err(RetrieverError::DirectoryResolution(message)) => (None, Some(message)),
                Err(err) => (None, Some(err.to_string())),
            };
        Ok(Self {
            target_dir,
            format,
            options,
            manifest_path,
            resolution_error,
            queued: Vec::new(),
            collisions: Vec::new(),
            records: Vec::new(),
            index: HashMap::new(),
            loaded: false,
            diagnostics: Diagnostics::new(),
        })
    }

    pub fn manifest_path(&self) -> Option<&Utf8Path> {
        self.manifest_path.as_deref()
    }

    pub fn records(&self) -> impl Iterator<Item = &ChecksumRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, relative_path: &str) -> Option<&ChecksumRecord> {
        self.index
            .get(&PathKey::new(relative_path))
            .map(|&idx| &self.records[idx])
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    pub fn insert(&mut self, record: ChecksumRecord) -> bool {
        if self.index.contains_key(record.key()) {
            return false;
        }
        self.index.insert(record.key().clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Files queued before `load` take part in repairing bare names of older manifests.
    pub fn queue_file(&mut self, path: Utf8PathBuf) {
        let path = absolute(&path).unwrap_or(path);
        if !self.queued.contains(&path) {
            self.queued.push(path);
        }
    }

    pub fn add_file(&mut self, path: Utf8PathBuf) -> PathKey {
        let path = absolute(&path).unwrap_or(path);
        self.queue_file(path.clone());
        let idx = self.attach(&path);
        self.records[idx].key().clone()
    }

    pub fn load(&mut self) -> Result<LoadOutcome, RetrieverError> {
        if self.loaded {
            self.diagnostics
                .debug(format!("manifest for {} already loaded", self.target_dir));
            return Ok(LoadOutcome {
                records: self.records.len(),
                ..LoadOutcome::default()
            });
        }
        self.loaded = true;

        let Some(manifest) = self.manifest_path.clone() else {
            return Err(self.resolution_failure());
        };

        let Some(source) = self.locate(&manifest)? else {
            self.diagnostics.status(format!(
                "no existing checksum file for {}; starting empty",
                self.target_dir
            ));
            return Ok(LoadOutcome::default());
        };

        let bytes = fs::read(source.as_std_path()).map_err(|err| RetrieverError::ManifestRead {
            path: source.to_string(),
            message: err.to_string(),
        })?;
        let content = String::from_utf8_lossy(&bytes);
        let before = self.records.len();
        let (duplicates, repaired) = match self.format {
            ChecksumFormat::Archive => (self.parse_archive(&source, &content), 0),
            ChecksumFormat::Manifest => self.parse_manifest(&source, &content),
            ChecksumFormat::None => (0, 0),
        };

        let outcome = LoadOutcome {
            source: Some(source.clone()),
            records: self.records.len() - before,
            duplicates,
            repaired,
        };
        self.diagnostics.debug(format!(
            "loaded {} checksum row(s) from {source}",
            outcome.records
        ));
        Ok(outcome)
    }

    pub fn reconcile(&mut self) {
        let queued = self.queued.clone();
        for path in &queued {
            self.attach(path);
        }
    }

    pub fn compute_missing(
        &mut self,
        hasher: &dyn HashComputer,
        sink: &dyn ProgressSink,
        options: HashOptions,
    ) -> HashSummary {
        self.reconcile();
        let pending = self.pending_hashes(options.force);
        let mut summary = HashSummary::default();
        if pending.is_empty() {
            self.diagnostics
                .debug(format!("all checksums present for {}", self.target_dir));
            return summary;
        }

        if self.options.preview {
            for item in &pending {
                self.diagnostics.status(format!(
                    "preview: would compute {} for {}",
                    describe_request(item.request),
                    item.path
                ));
            }
            return summary;
        }

        let total_bytes: u64 = pending
            .iter()
            .filter_map(|item| fs::metadata(item.path.as_std_path()).ok())
            .map(|meta| meta.len())
            .sum();
        let started = Instant::now();
        let mut last_report = started;
        let mut processed = 0u64;

        for item in pending {
            if !item.path.as_std_path().is_file() {
                self.diagnostics.warning(format!(
                    "file not found, checksum skipped: {}",
                    item.path
                ));
                summary.missing += 1;
                continue;
            }

            let mut on_bytes = |bytes: u64| {
                processed += bytes;
                if last_report.elapsed() >= options.progress_interval {
                    last_report = Instant::now();
                    sink.event(ProgressEvent {
                        message: format!("phase=Hash; {processed} of {total_bytes} bytes"),
                        elapsed: Some(started.elapsed()),
                        percent: Some(percent_of(processed, total_bytes)),
                    });
                }
            };
            match hasher.compute(&item.path, item.request, &mut on_bytes) {
                Ok(digests) => {
                    let record = &mut self.records[item.record];
                    if let Some(sha1) = digests.sha1.filter(|_| record.sha1.is_empty()) {
                        record.sha1 = sha1;
                    }
                    if record.md5.is_empty() {
                        if let Some(md5) = digests.md5 {
                            record.md5_base64 = digests
                                .md5_base64
                                .or_else(|| md5_hex_to_base64(&md5))
                                .unwrap_or_default();
                            record.md5 = md5;
                        }
                    }
                    summary.hashed += 1;
                }
                Err(err) => {
                    self.diagnostics.error(err.to_string());
                    summary.failed += 1;
                }
            }
        }

        summary.bytes = processed;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Hash; hashed {} file(s) for {}",
                summary.hashed, self.target_dir
            ),
            elapsed: Some(started.elapsed()),
            percent: Some(100.0),
        });
        summary
    }

    pub fn write(&mut self) -> Result<WriteOutcome, RetrieverError> {
        let Some(path) = self.manifest_path.clone() else {
            return Err(self.resolution_failure());
        };

        if self.records.is_empty() {
            self.diagnostics
                .status(format!("no checksums to write for {}", self.target_dir));
            return Ok(WriteOutcome {
                path: Some(path),
                rows: 0,
                written: false,
            });
        }

        if self.options.preview {
            self.diagnostics.status(format!(
                "preview: would write {} checksum row(s) to {path}",
                self.records.len()
            ));
            return Ok(WriteOutcome {
                path: Some(path),
                rows: self.records.len(),
                written: false,
            });
        }

        let content = self.render(&path);
        write_atomic(&path, content.as_bytes()).map_err(|message| {
            let err = RetrieverError::ManifestWrite {
                path: path.to_string(),
                message,
            };
            self.diagnostics.error(err.to_string());
            err
        })?;
        self.diagnostics.status(format!(
            "wrote {} checksum row(s) to {path}",
            self.records.len()
        ));
        Ok(WriteOutcome {
            path: Some(path),
            rows: self.records.len(),
            written: true,
        })
    }

    fn render(&self, path: &Utf8Path) -> String {
        let delimiter = self.format.delimiter_for(path);
        let mut out = String::new();
        if let Some(header) = self.format.header(delimiter) {
            out.push_str(&header);
            out.push('\n');
        }
        for record in &self.records {
            let line = match self.format {
                ChecksumFormat::Manifest => format_manifest_row(
                    &self.output_relative_path(record),
                    &record.md5,
                    &record.sha1,
                    delimiter,
                ),
                ChecksumFormat::Archive | ChecksumFormat::None => {
                    format_archive_row(&record.sha1, record.relative_path())
                }
            };
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    fn resolution_failure(&mut self) -> RetrieverError {
        let message = self
            .resolution_error
            .clone()
            .unwrap_or_else(|| format!("no manifest path for {}", self.target_dir));
        self.diagnostics
            .error(format!("cannot resolve checksum file path: {message}"));
        RetrieverError::DirectoryResolution(message)
    }

    fn locate(&mut self, manifest: &Utf8Path) -> Result<Option<Utf8PathBuf>, RetrieverError> {
        if is_non_empty_file(manifest) {
            return Ok(Some(manifest.to_path_buf()));
        }

        let mut candidates: Vec<Utf8PathBuf> = Vec::new();
        for dir in [manifest.parent(), self.options.base_output.as_deref()]
            .into_iter()
            .flatten()
        {
            if !candidates.iter().any(|known| known == dir) {
                candidates.push(dir.to_path_buf());
            }
        }

        let patterns = self
            .format
            .fallback_patterns(&self.target_dir)
            .iter()
            .map(|pattern| GlobPattern::new(pattern, true))
            .collect::<Result<Vec<_>, _>>()?;

        for dir in &candidates {
            for pattern in &patterns {
                let found = matching_files(dir, pattern)?
                    .into_iter()
                    .find(|path| is_non_empty_file(path));
                if let Some(found) = found {
                    self.diagnostics.status(format!(
                        "using checksum file {found} (matched {} in {dir})",
                        pattern.as_str()
                    ));
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn parse_archive(&mut self, source: &Utf8Path, content: &str) -> usize {
        let mut duplicates = 0;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some(row) = parse_archive_row(line) else {
                self.diagnostics.warning(format!(
                    "{source}:{}: expected <sha1><tab>*<file name>, skipping row",
                    line_no + 1
                ));
                continue;
            };
            if row.filename.is_empty() {
                self.diagnostics
                    .warning(format!("{source}:{}: empty file name, skipping row", line_no + 1));
                continue;
            }
            let mut record = ChecksumRecord::new(&row.filename);
            record.sha1 = row.sha1;
            if !self.insert_loaded(source, line_no, record) {
                duplicates += 1;
            }
        }
        duplicates
    }

    fn parse_manifest(&mut self, source: &Utf8Path, content: &str) -> (usize, usize) {
        let delimiter = self.format.delimiter_for(source);
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let Some((_, header)) = lines.next() else {
            return (0, 0);
        };
        let columns = match resolve_header(header, delimiter, self.options.header) {
            Ok(columns) => columns,
            Err(missing) => {
                self.diagnostics.warning(format!(
                    "{source}: unrecognized header, no rows loaded; {}",
                    missing.describe()
                ));
                return (0, 0);
            }
        };

        let mut duplicates = 0;
        let mut repaired = 0;
        for (line_no, line) in lines {
            let row = parse_manifest_row(line, delimiter, &columns);
            if row.filename.is_empty() {
                self.diagnostics
                    .warning(format!("{source}:{}: empty file name, skipping row", line_no + 1));
                continue;
            }
            let relative = match self.repair_bare_name(&row.filename) {
                Some(full) => {
                    repaired += 1;
                    full
                }
                None => row.filename.clone(),
            };
            let record = ChecksumRecord::with_digests(&relative, &row.md5, &row.sha1);
            if !self.insert_loaded(source, line_no, record) {
                duplicates += 1;
            }
        }
        (duplicates, repaired)
    }

    fn insert_loaded(&mut self, source: &Utf8Path, line_no: usize, record: ChecksumRecord) -> bool {
        let key = record.key().clone();
        let inserted = self.insert(record);
        if !inserted {
            self.diagnostics.warning(format!(
                "{source}:{}: duplicate entry for {key}, keeping the first",
                line_no + 1
            ));
        }
        inserted
    }

    /// Older manifests list bare file names; map one to its path below the base
    /// output directory when exactly one queued file carries that name.
    fn repair_bare_name(&mut self, filename: &str) -> Option<String> {
        if has_separator(filename) {
            return None;
        }
        let base = self.options.base_output.clone()?;
        let matches = self
            .queued
            .iter()
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.eq_ignore_ascii_case(filename))
            })
            .collect::<Vec<_>>();
        match matches.as_slice() {
            [] => None,
            [only] if only.starts_with(&base) => relative_to(only, base_root(&base)),
            [_] => None,
            many => {
                self.diagnostics.warning(format!(
                    "{filename} matches {} queued files; keeping the bare name",
                    many.len()
                ));
                None
            }
        }
    }

    /// A second file mapping to a key already owned by another file is reported and
    /// left without a row; the owner keeps the record.
    fn attach(&mut self, path: &Utf8Path) -> usize {
        let relative = self.relative_path_for(path);
        let key = PathKey::new(&relative);
        let Some(&idx) = self.index.get(&key) else {
            let mut record = ChecksumRecord::new(&relative);
            record.set_full_path(path.to_path_buf());
            self.index.insert(key, self.records.len());
            self.records.push(record);
            return self.records.len() - 1;
        };

        let owner = self.records[idx]
            .full_path()
            .filter(|owner| owner.as_path() != path)
            .cloned();
        match owner {
            Some(owner) => {
                if !self.collisions.iter().any(|known| known.as_path() == path) {
                    self.collisions.push(path.to_path_buf());
                    self.diagnostics.warning(format!(
                        "{path} maps to manifest entry {key} already used by {owner}; no checksum row written for it"
                    ));
                }
            }
            None => self.records[idx].set_full_path(path.to_path_buf()),
        }
        idx
    }

    fn relative_path_for(&self, path: &Utf8Path) -> String {
        let fallback = || path.file_name().unwrap_or(path.as_str()).to_string();
        match self.format {
            ChecksumFormat::Archive => relative_to(path, &self.target_dir).unwrap_or_else(fallback),
            ChecksumFormat::Manifest | ChecksumFormat::None => self
                .base_relative(path)
                .unwrap_or_else(fallback),
        }
    }

    fn base_relative(&self, path: &Utf8Path) -> Option<String> {
        let base = self.options.base_output.as_deref()?;
        if !path.starts_with(base) || path == base {
            return None;
        }
        relative_to(path, base_root(base))
    }

    fn output_relative_path(&self, record: &ChecksumRecord) -> String {
        record
            .full_path()
            .and_then(|full| self.base_relative(full))
            .unwrap_or_else(|| record.relative_path().to_string())
    }

    fn pending_hashes(&mut self, force: bool) -> Vec<PendingHash> {
        let tracks_md5 = self.format.tracks_md5();
        let mut pending = Vec::new();
        for path in self.queued.clone() {
            let relative = self.relative_path_for(&path);
            let Some(&idx) = self.index.get(&PathKey::new(&relative)) else {
                continue;
            };
            let record = &mut self.records[idx];
            if record.full_path() != Some(&path) {
                continue;
            }
            if force {
                record.clear_digests();
            }
            let request = DigestRequest {
                md5: tracks_md5 && record.md5.is_empty(),
                sha1: record.sha1.is_empty(),
            };
            if !request.is_empty() {
                pending.push(PendingHash {
                    record: idx,
                    path,
                    request,
                });
            }
        }
        pending
    }
}

fn base_root(base: &Utf8Path) -> &Utf8Path {
    base.parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(base)
}

fn is_non_empty_file(path: &Utf8Path) -> bool {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn percent_of(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64 * 100.0).min(100.0)
}

fn describe_request(request: DigestRequest) -> &'static str {
    match (request.md5, request.sha1) {
        (true, true) => "MD5 and SHA-1",
        (true, false) => "MD5",
        (false, true) => "SHA-1",
        (false, false) => "nothing",
    }
}

fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), String> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .ok_or_else(|| "invalid destination path".to_string())?;
    fs::create_dir_all(parent.as_std_path()).map_err(|err| err.to_string())?;
    let mut temp = tempfile::Builder::new()
        .prefix(MANIFEST_TEMP_PREFIX)
        .tempfile_in(parent.as_std_path())
        .map_err(|err| err.to_string())?;
    temp.write_all(content).map_err(|err| err.to_string())?;
    temp.as_file().sync_all().map_err(|err| err.to_string())?;
    temp.persist(path.as_std_path())
        .map_err(|err| err.error.to_string())?;
    Ok(())
}
