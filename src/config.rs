use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Variant;
use crate::error::OasisError;
use crate::fetcher::FetchControls;
use crate::manifest::{SubjectCount, resolve_subject_count};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FetchRequest {
    #[serde(default)]
    pub n_subjects: Option<i64>,
    #[serde(default = "default_true")]
    pub dartel_version: bool,
    #[serde(default)]
    pub data_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub resume: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_verbose")]
    pub verbose: u8,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            n_subjects: None,
            dartel_version: true,
            data_dir: None,
            url: None,
            resume: true,
            force: false,
            verbose: default_verbose(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub variant: Variant,
    pub subjects: SubjectCount,
    pub data_dir: Option<Utf8PathBuf>,
    pub base_url: Option<String>,
    pub controls: FetchControls,
}

impl FetchRequest {
    pub fn variant(&self) -> Variant {
        Variant::from_dartel_flag(self.dartel_version)
    }

    pub fn resolve(&self) -> Result<ResolvedRequest, OasisError> {
        let variant = self.variant();
        let subjects = resolve_subject_count(self.n_subjects, variant)?;
        let base_url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| url.to_string());

        Ok(ResolvedRequest {
            variant,
            subjects,
            data_dir: self.data_dir.clone(),
            base_url,
            controls: FetchControls {
                resume: self.resume,
                force: self.force,
                verbose: self.verbose,
            },
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_verbose() -> u8 {
    1
}
