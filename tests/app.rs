use std::fs;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;

use dataset_retriever::app::{App, ProgressEvent, ProgressSink};
use dataset_retriever::config::ResolvedConfig;
use dataset_retriever::discovery::DirectoryWalker;
use dataset_retriever::domain::{ChecksumFormat, CopyMode};
use dataset_retriever::error::RetrieverError;
use dataset_retriever::hasher::StreamingHasher;
use dataset_retriever::input::parse_input;
use dataset_retriever::output::JsonOutput;
use dataset_retriever::report::Diagnostics;
use dataset_retriever::source::{DatasetLocation, DatasetSource, LocalStorageSource};

const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";
const ABC_MD5: &str = "900150983cd24fb0d6963f7d28e17f72";

#[derive(Default)]
struct PhaseSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for PhaseSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct BrokenSource;

impl DatasetSource for BrokenSource {
    fn resolve(&self, _dataset: &str) -> Result<Option<DatasetLocation>, RetrieverError> {
        Err(RetrieverError::Filesystem("storage offline".to_string()))
    }
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn write_file(path: &Utf8Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"abc").unwrap();
}

fn config(format: ChecksumFormat) -> ResolvedConfig {
    ResolvedConfig {
        checksum_format: format,
        manifest_date: NaiveDate::from_ymd_opt(2024, 3, 7),
        ..ResolvedConfig::default()
    }
}

fn storage(root: &Utf8Path) -> Utf8PathBuf {
    let storage = root.join("storage");
    write_file(&storage.join("QC_Shew_01/QC_Shew_01.raw"));
    write_file(&storage.join("QC_Shew_01/sub/QC_Shew_01_scan.mzML"));
    write_file(&storage.join("Blank_02.raw"));
    storage
}

#[test]
fn retrieve_renames_and_writes_archive_checksums() {
    let (_temp, root) = temp_root();
    let storage = storage(&root);
    let app = App::new(
        config(ChecksumFormat::Archive),
        LocalStorageSource::new(vec![storage]),
        StreamingHasher::new(),
        DirectoryWalker::new().unwrap(),
    );
    let mut diagnostics = Diagnostics::new();
    let rows = parse_input(
        "dataset\ttarget_directory\tnew_name\nQC_Shew_01\trun1\tQC_A\n",
        &mut diagnostics,
    )
    .unwrap();
    let output = root.join("out");

    let sink = PhaseSink::default();
    let result = app.retrieve(&rows, &output, &sink);

    assert!(result.success);
    assert_eq!(result.datasets[0].copied, 2);
    assert!(output.join("run1/QC_A.raw").as_std_path().is_file());
    assert!(output.join("run1/sub/QC_A_scan.mzML").as_std_path().is_file());
    let manifest = output.join("run1.cksum");
    let expected = format!("{ABC_SHA1}\t*QC_A.raw\n{ABC_SHA1}\t*sub/QC_A_scan.mzML\n");
    assert_eq!(fs::read_to_string(&manifest).unwrap(), expected);

    let phases = sink.messages.lock().unwrap();
    for phase in ["phase=Resolve", "phase=Load", "phase=Hash", "phase=Write"] {
        assert!(phases.iter().any(|message| message.starts_with(phase)), "{phase}");
    }
    drop(phases);

    let again = app.retrieve(&rows, &output, &JsonOutput);
    assert!(again.success);
    assert_eq!(again.datasets[0].skipped, 2);
    assert_eq!(again.directories[0].hashed, 0);
    assert_eq!(fs::read_to_string(&manifest).unwrap(), expected);
}

#[test]
fn retrieve_loose_files_with_link_mode() {
    let (_temp, root) = temp_root();
    let storage = storage(&root);
    let config = ResolvedConfig {
        copy_mode: CopyMode::Link,
        ..config(ChecksumFormat::Manifest)
    };
    let app = App::new(
        config,
        LocalStorageSource::new(vec![storage]),
        StreamingHasher::new(),
        DirectoryWalker::new().unwrap(),
    );
    let mut diagnostics = Diagnostics::new();
    let rows = parse_input("dataset\nBlank_02\n", &mut diagnostics).unwrap();
    let output = root.join("out");

    let result = app.retrieve(&rows, &output, &JsonOutput);

    assert!(result.success);
    assert_eq!(result.datasets[0].linked, 1);
    let written = fs::read_to_string(output.join("file_manifest_20240307.csv")).unwrap();
    assert_eq!(
        written,
        format!("file_name,md5,sha1\nout/Blank_02.raw,{ABC_MD5},{ABC_SHA1}\n")
    );
}

#[test]
fn same_file_name_in_two_targets_gets_two_rows() {
    let (_temp, root) = temp_root();
    let storage = root.join("storage");
    fs::create_dir_all(storage.join("DS_A")).unwrap();
    fs::create_dir_all(storage.join("DS_B")).unwrap();
    fs::write(storage.join("DS_A/data.raw"), b"AAAA").unwrap();
    fs::write(storage.join("DS_B/data.raw"), b"BBBBBBB").unwrap();
    let app = App::new(
        config(ChecksumFormat::Manifest),
        LocalStorageSource::new(vec![storage]),
        StreamingHasher::new(),
        DirectoryWalker::new().unwrap(),
    );
    let mut diagnostics = Diagnostics::new();
    let rows = parse_input(
        "dataset\ttarget_directory\nDS_A\tx\nDS_B\ty\n",
        &mut diagnostics,
    )
    .unwrap();
    let output = root.join("out");

    let result = app.retrieve(&rows, &output, &JsonOutput);

    assert!(result.success);
    assert_eq!(result.directories.len(), 2);
    assert!(result.directories.iter().all(|item| item.hashed == 1));
    let written = fs::read_to_string(output.join("file_manifest_20240307.csv")).unwrap();
    let lines = written.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "file_name,md5,sha1");
    assert!(lines[1].starts_with("out/x/data.raw,"));
    assert!(lines[2].starts_with("out/y/data.raw,"));
    let sha1 = |line: &str| line.rsplit(',').next().unwrap().to_string();
    assert_ne!(sha1(lines[1]), sha1(lines[2]));
}

#[test]
fn checksum_directories_isolates_failures() {
    let (_temp, root) = temp_root();
    let base = root.join("out");
    write_file(&base.join("run1/a.raw"));
    write_file(&base.join("run1/nested/b.raw"));
    let config = ResolvedConfig {
        base_output_dir: Some(base.clone()),
        ..config(ChecksumFormat::Manifest)
    };
    let app = App::new(
        config,
        LocalStorageSource::new(Vec::new()),
        StreamingHasher::new(),
        DirectoryWalker::new().unwrap(),
    );

    let dirs = vec![base.join("missing"), base.join("run1")];
    let result = app.checksum_directories(&dirs, &JsonOutput);

    assert!(!result.success);
    assert_eq!(result.failed_directories, 1);
    let ok = result
        .directories
        .iter()
        .find(|item| item.directory == base.join("run1").as_str())
        .unwrap();
    assert!(ok.success);
    assert_eq!(ok.hashed, 2);
    let written = fs::read_to_string(base.join("file_manifest_20240307.csv")).unwrap();
    assert_eq!(
        written,
        format!(
            "file_name,md5,sha1\nout/run1/a.raw,{ABC_MD5},{ABC_SHA1}\nout/run1/nested/b.raw,{ABC_MD5},{ABC_SHA1}\n"
        )
    );

    let again = app.checksum_directories(&[base.join("run1")], &JsonOutput);
    assert!(again.success);
    assert_eq!(again.directories[0].loaded_rows, 2);
    assert_eq!(again.directories[0].hashed, 0);
}

#[test]
fn preview_places_nothing() {
    let (_temp, root) = temp_root();
    let storage = storage(&root);
    let config = ResolvedConfig {
        preview: true,
        ..config(ChecksumFormat::Archive)
    };
    let app = App::new(
        config,
        LocalStorageSource::new(vec![storage]),
        StreamingHasher::new(),
        DirectoryWalker::new().unwrap(),
    );
    let mut diagnostics = Diagnostics::new();
    let rows = parse_input("dataset\tfile_pattern\nQC_Shew_01\t*.raw\n", &mut diagnostics).unwrap();

    let result = app.retrieve(&rows, &root.join("out"), &JsonOutput);

    assert!(result.success);
    assert!(!root.join("out").as_std_path().exists());
    assert!(!result.directories[0].written);
}

#[test]
fn source_errors_fail_only_their_dataset() {
    let (_temp, root) = temp_root();
    let app = App::new(
        config(ChecksumFormat::Archive),
        BrokenSource,
        StreamingHasher::new(),
        DirectoryWalker::new().unwrap(),
    );
    let mut diagnostics = Diagnostics::new();
    let rows = parse_input("dataset\nA_01\nB_02\n", &mut diagnostics).unwrap();

    let result = app.retrieve(&rows, &root.join("out"), &JsonOutput);

    assert_eq!(result.failed_datasets, 2);
    assert!(result.directories.is_empty());
    assert!(result.datasets[0].error.as_deref().unwrap().contains("storage offline"));
}
