use std::sync::LazyLock;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{FetchRequest, ResolvedRequest};
use crate::covariates::CovariatesTable;
use crate::domain::{SubjectId, Variant};
use crate::error::OasisError;
use crate::fetcher::{FetchControls, Fetcher, HttpFetcher};
use crate::manifest::{Manifest, build_manifest};
use crate::store::Store;

static SUBJECT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"OAS1_(\d{4})").expect("subject token pattern is valid"));

#[derive(Debug, Clone, Serialize)]
pub struct OasisVbmBundle {
    pub variant: Variant,
    pub subjects: Vec<SubjectId>,
    pub gray_matter_maps: Vec<Utf8PathBuf>,
    pub white_matter_maps: Vec<Utf8PathBuf>,
    pub ext_vars: CovariatesTable,
    pub data_usage_agreement: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub struct OasisVbm<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> OasisVbm<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn fetch(
        &self,
        request: &ResolvedRequest,
        sink: &dyn ProgressSink,
    ) -> Result<OasisVbmBundle, OasisError> {
        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} subjects from the {} version",
                request.subjects.count, request.variant
            ),
            elapsed: None,
        });
        let manifest = build_manifest(
            request.subjects.count,
            request.variant,
            request.base_url.as_deref(),
        )?;
        debug!(
            entries = manifest.entries.len(),
            subjects = manifest.subject_count(),
            "manifest built"
        );
        fetch_and_split(&self.fetcher, &manifest, &request.controls, sink)
    }
}

pub fn fetch_and_split<F: Fetcher + ?Sized>(
    fetcher: &F,
    manifest: &Manifest,
    controls: &FetchControls,
    sink: &dyn ProgressSink,
) -> Result<OasisVbmBundle, OasisError> {
    let started = Instant::now();
    sink.event(ProgressEvent {
        message: format!("phase=Fetch; {} resources", manifest.entries.len()),
        elapsed: None,
    });
    let files = fetcher.fetch(&manifest.entries, controls)?;
    if files.len() != manifest.entries.len() {
        return Err(OasisError::FetchLength {
            expected: manifest.entries.len(),
            actual: files.len(),
        });
    }
    sink.event(ProgressEvent {
        message: "phase=Fetch; resources available".to_string(),
        elapsed: Some(started.elapsed()),
    });

    let n = manifest.subject_count();
    let gray_matter_maps = files[..n].to_vec();
    let white_matter_maps = files[n..2 * n].to_vec();
    let ext_vars_file = &files[files.len() - 2];
    let data_usage_agreement = files[files.len() - 1].clone();

    let subjects = gray_matter_maps
        .iter()
        .map(|path| subject_from_path(path))
        .collect::<Result<Vec<_>, _>>()?;

    sink.event(ProgressEvent {
        message: format!("phase=Filter; keeping covariates for {} subjects", subjects.len()),
        elapsed: None,
    });
    let ext_vars = CovariatesTable::from_path(ext_vars_file.as_std_path())?.filter_subjects(&subjects);

    Ok(OasisVbmBundle {
        variant: manifest.variant,
        subjects,
        gray_matter_maps,
        white_matter_maps,
        ext_vars,
        data_usage_agreement,
    })
}

pub fn subject_from_path(path: &Utf8Path) -> Result<SubjectId, OasisError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| OasisError::InvalidSubjectId(path.to_string()))?;
    let captures = SUBJECT_TOKEN
        .captures(file_name)
        .ok_or_else(|| OasisError::InvalidSubjectId(file_name.to_string()))?;
    captures[1].parse()
}

pub fn fetch_oasis_vbm(request: &FetchRequest) -> Result<OasisVbmBundle, OasisError> {
    let resolved = request.resolve()?;
    let store = Store::resolve(resolved.data_dir.as_deref())?;
    let app = OasisVbm::new(HttpFetcher::new(store)?);
    let sink: &dyn ProgressSink = if resolved.controls.verbose > 0 {
        &TracingSink
    } else {
        &NullSink
    };
    app.fetch(&resolved, sink)
}
