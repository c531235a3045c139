mod common;

use std::fs;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use oasis_vbm::config::FetchRequest;
use oasis_vbm::dataset::{NullSink, OasisVbm, ProgressEvent, ProgressSink, fetch_and_split};
use oasis_vbm::domain::Variant;
use oasis_vbm::error::OasisError;
use oasis_vbm::fetcher::{FetchControls, Fetcher};
use oasis_vbm::manifest::{COVARIATES_FILE, ResourceEntry, build_manifest};

struct DiskFetcher {
    root: Utf8PathBuf,
    csv: String,
    calls: Mutex<Vec<(usize, FetchControls)>>,
}

impl DiskFetcher {
    fn new(root: Utf8PathBuf, csv: String) -> Self {
        Self {
            root,
            csv,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl Fetcher for DiskFetcher {
    fn fetch(
        &self,
        entries: &[ResourceEntry],
        controls: &FetchControls,
    ) -> Result<Vec<Utf8PathBuf>, OasisError> {
        self.calls.lock().unwrap().push((entries.len(), *controls));
        let mut paths = Vec::new();
        for entry in entries {
            let path = self.root.join(&entry.relative_path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            let content = if entry.relative_path == COVARIATES_FILE {
                self.csv.as_bytes()
            } else {
                b"payload".as_slice()
            };
            fs::write(&path, content).unwrap();
            paths.push(path);
        }
        Ok(paths)
    }
}

struct FailingFetcher;

impl Fetcher for FailingFetcher {
    fn fetch(
        &self,
        _entries: &[ResourceEntry],
        _controls: &FetchControls,
    ) -> Result<Vec<Utf8PathBuf>, OasisError> {
        Err(OasisError::HttpStatus {
            status: 503,
            url: "http://mirror/archive_dartel.tgz".to_string(),
            message: "unavailable".to_string(),
        })
    }
}

struct ShortFetcher;

impl Fetcher for ShortFetcher {
    fn fetch(
        &self,
        entries: &[ResourceEntry],
        _controls: &FetchControls,
    ) -> Result<Vec<Utf8PathBuf>, OasisError> {
        Ok(entries
            .iter()
            .skip(1)
            .map(|entry| Utf8PathBuf::from(entry.relative_path.as_str()))
            .collect())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn bundle_pairs_maps_and_filters_covariates() {
    let (_temp, root) = scratch();
    let fetcher = DiskFetcher::new(root.clone(), common::covariates_csv(1..=10));
    let app = OasisVbm::new(fetcher);

    let request = FetchRequest {
        n_subjects: Some(5),
        ..FetchRequest::default()
    };
    let sink = RecordingSink::default();
    let bundle = app.fetch(&request.resolve().unwrap(), &sink).unwrap();

    assert_eq!(bundle.variant, Variant::Dartel);
    assert_eq!(bundle.gray_matter_maps.len(), 5);
    assert_eq!(bundle.white_matter_maps.len(), 5);
    assert_eq!(bundle.subjects.len(), 5);
    assert!(bundle.gray_matter_maps[0].as_str().contains("mwrc1OAS1_0001_MR1"));
    assert!(bundle.white_matter_maps[4].as_str().contains("mwrc2OAS1_0005_MR1"));
    assert!(bundle.data_usage_agreement.ends_with("data_usage_agreement.txt"));
    assert_eq!(
        bundle.ext_vars.ids(),
        vec![
            "OAS1_0001_MR1",
            "OAS1_0002_MR1",
            "OAS1_0003_MR1",
            "OAS1_0004_MR1",
            "OAS1_0005_MR1"
        ]
    );

    let calls = app.fetcher().calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, 12);
    assert_eq!(calls[0].1, FetchControls::default());

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|message| message.starts_with("phase=Resolve")));
    assert!(messages.iter().any(|message| message.starts_with("phase=Filter")));
}

#[test]
fn covariate_rows_match_retrieved_subjects_across_exclusions() {
    let (_temp, root) = scratch();
    let fetcher = DiskFetcher::new(root, common::covariates_csv(1..=456));
    let manifest = build_manifest(30, Variant::Dartel, None).unwrap();

    let bundle =
        fetch_and_split(&fetcher, &manifest, &FetchControls::default(), &NullSink).unwrap();

    assert_eq!(bundle.ext_vars.len(), 30);
    let labels = bundle
        .subjects
        .iter()
        .map(|subject| subject.session_label())
        .collect::<Vec<_>>();
    assert_eq!(bundle.ext_vars.ids(), labels);
    assert!(!labels.contains(&"OAS1_0008_MR1".to_string()));
}

#[test]
fn standard_full_fetch_keeps_lists_aligned() {
    let (_temp, root) = scratch();
    let fetcher = DiskFetcher::new(root, common::covariates_csv(1..=456));
    let app = OasisVbm::new(fetcher);

    let request = FetchRequest {
        dartel_version: false,
        resume: false,
        force: true,
        verbose: 0,
        ..FetchRequest::default()
    };
    let resolved = request.resolve().unwrap();
    assert_eq!(resolved.subjects.count, 415);

    let bundle = app.fetch(&resolved, &NullSink).unwrap();
    assert_eq!(bundle.gray_matter_maps.len(), bundle.white_matter_maps.len());
    assert_eq!(bundle.gray_matter_maps.len(), bundle.ext_vars.len());
    assert!(bundle.white_matter_maps.iter().all(|path| path.as_str().contains("/mwc2")));

    let calls = app.fetcher().calls.lock().unwrap();
    assert_eq!(
        calls[0].1,
        FetchControls {
            resume: false,
            force: true,
            verbose: 0
        }
    );
}

#[test]
fn invalid_count_fails_before_fetching() {
    let (_temp, root) = scratch();
    let app = OasisVbm::new(DiskFetcher::new(root, common::covariates_csv(1..=3)));

    let request = FetchRequest {
        n_subjects: Some(0),
        ..FetchRequest::default()
    };
    let result = request
        .resolve()
        .and_then(|resolved| app.fetch(&resolved, &NullSink));

    assert_matches!(result, Err(OasisError::InvalidSubjectCount(0)));
    assert!(app.fetcher().calls.lock().unwrap().is_empty());
}

#[test]
fn retrieval_errors_are_propagated() {
    let manifest = build_manifest(3, Variant::Dartel, None).unwrap();
    let result = fetch_and_split(
        &FailingFetcher,
        &manifest,
        &FetchControls::default(),
        &NullSink,
    );
    assert_matches!(result, Err(OasisError::HttpStatus { status: 503, .. }));
}

#[test]
fn short_fetch_result_is_rejected() {
    let manifest = build_manifest(2, Variant::Dartel, None).unwrap();
    let result = fetch_and_split(&ShortFetcher, &manifest, &FetchControls::default(), &NullSink);
    assert_matches!(
        result,
        Err(OasisError::FetchLength {
            expected: 6,
            actual: 5
        })
    );
}

#[test]
fn malformed_covariates_are_propagated() {
    let (_temp, root) = scratch();
    let fetcher = DiskFetcher::new(root, "Subject,Age\nOAS1_0001_MR1,70\n".to_string());
    let manifest = build_manifest(1, Variant::Dartel, None).unwrap();
    let result = fetch_and_split(&fetcher, &manifest, &FetchControls::default(), &NullSink);
    assert_matches!(result, Err(OasisError::MissingIdColumn(_)));
}
