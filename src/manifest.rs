use serde::Serialize;
use tracing::warn;

use crate::domain::{LAST_SUBJECT, MISSING_SUBJECTS, SubjectId, Variant};
use crate::error::OasisError;

pub const COVARIATES_FILE: &str = "oasis_cross-sectional.csv";
pub const AGREEMENT_FILE: &str = "data_usage_agreement.txt";

const NITRC_DARTEL_ARCHIVE: &str =
    "https://www.nitrc.org/frs/download.php/6364/archive_dartel.tgz?i_agree=1&download_now=1";
const NITRC_STANDARD_ARCHIVE: &str =
    "https://www.nitrc.org/frs/download.php/6359/archive.tgz?i_agree=1&download_now=1";
const NITRC_COVARIATES: &str =
    "https://www.nitrc.org/frs/download.php/6348/oasis_cross-sectional.csv?i_agree=1&download_now=1";
const NITRC_AGREEMENT: &str =
    "https://www.nitrc.org/frs/download.php/6349/data_usage_agreement.txt?i_agree=1&download_now=1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubjectCount {
    pub count: usize,
    pub clamped_from: Option<i64>,
}

impl SubjectCount {
    pub fn was_clamped(&self) -> bool {
        self.clamped_from.is_some()
    }
}

pub fn resolve_subject_count(
    requested: Option<i64>,
    variant: Variant,
) -> Result<SubjectCount, OasisError> {
    let cap = variant.subject_cap();
    let Some(requested) = requested else {
        return Ok(SubjectCount {
            count: cap,
            clamped_from: None,
        });
    };
    if requested < 1 {
        return Err(OasisError::InvalidSubjectCount(requested));
    }
    if requested as u64 > cap as u64 {
        warn!(
            requested,
            available = cap,
            variant = %variant,
            "only {cap} subjects are available in the {variant} version of the dataset; all of them will be used"
        );
        return Ok(SubjectCount {
            count: cap,
            clamped_from: Some(requested),
        });
    }
    Ok(SubjectCount {
        count: requested as usize,
        clamped_from: None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceUrls {
    pub images: String,
    pub covariates: String,
    pub agreement: String,
}

impl SourceUrls {
    pub fn resolve(variant: Variant, base_url: Option<&str>) -> Result<Self, OasisError> {
        let Some(base) = base_url else {
            let images = match variant {
                Variant::Dartel => NITRC_DARTEL_ARCHIVE,
                Variant::Standard => NITRC_STANDARD_ARCHIVE,
            };
            return Ok(Self {
                images: images.to_string(),
                covariates: NITRC_COVARIATES.to_string(),
                agreement: NITRC_AGREEMENT.to_string(),
            });
        };

        let base = base.trim().trim_end_matches('/');
        let has_scheme = base
            .split_once("://")
            .map(|(scheme, rest)| !scheme.is_empty() && !rest.is_empty())
            .unwrap_or(false);
        if !has_scheme {
            return Err(OasisError::InvalidUrl(base.to_string()));
        }
        Ok(Self {
            images: format!("{base}/{}", variant.archive_name()),
            covariates: format!("{base}/{COVARIATES_FILE}"),
            agreement: format!("{base}/{AGREEMENT_FILE}"),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceOptions {
    pub uncompress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEntry {
    pub relative_path: String,
    pub url: String,
    pub options: ResourceOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub variant: Variant,
    pub requested: usize,
    pub subjects: Vec<SubjectId>,
    pub entries: Vec<ResourceEntry>,
}

impl Manifest {
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.subject_count())
    }

    pub fn gray_matter(&self) -> &[ResourceEntry] {
        &self.entries[..self.subject_count()]
    }

    pub fn white_matter(&self) -> &[ResourceEntry] {
        let n = self.subject_count();
        &self.entries[n..2 * n]
    }

    pub fn covariates(&self) -> &ResourceEntry {
        &self.entries[self.entries.len() - 2]
    }

    pub fn agreement(&self) -> &ResourceEntry {
        &self.entries[self.entries.len() - 1]
    }
}

pub fn exclusion_set(variant: Variant) -> Vec<u16> {
    let mut excluded: Vec<u16> = MISSING_SUBJECTS
        .iter()
        .chain(variant.outliers())
        .copied()
        .collect();
    excluded.sort_unstable();
    excluded.dedup();
    excluded
}

pub fn available_subjects(variant: Variant) -> Vec<SubjectId> {
    let excluded = exclusion_set(variant);
    (1..=LAST_SUBJECT)
        .filter(|number| excluded.binary_search(number).is_err())
        .filter_map(|number| SubjectId::new(number).ok())
        .collect()
}

pub fn map_path(subject: SubjectId, prefix: &str) -> String {
    let label = subject.session_label();
    format!("{label}/{prefix}{label}_mpr_anon_fslswapdim_bet.nii.gz")
}

pub fn build_manifest(
    effective_count: usize,
    variant: Variant,
    base_url: Option<&str>,
) -> Result<Manifest, OasisError> {
    if effective_count < 1 {
        return Err(OasisError::InvalidSubjectCount(effective_count as i64));
    }
    let urls = SourceUrls::resolve(variant, base_url)?;

    let available = available_subjects(variant);
    if effective_count > available.len() {
        warn!(
            requested = effective_count,
            available = available.len(),
            variant = %variant,
            "fewer subjects enumerate than requested; truncating to the available subjects"
        );
    }
    let subjects: Vec<SubjectId> = available.into_iter().take(effective_count).collect();

    let archived = ResourceOptions { uncompress: true };
    let maps = |prefix: &str| {
        subjects
            .iter()
            .map(|subject| ResourceEntry {
                relative_path: map_path(*subject, prefix),
                url: urls.images.clone(),
                options: archived,
            })
            .collect::<Vec<_>>()
    };

    let mut entries = maps(variant.gray_matter_prefix());
    entries.extend(maps(variant.white_matter_prefix()));
    entries.push(ResourceEntry {
        relative_path: COVARIATES_FILE.to_string(),
        url: urls.covariates,
        options: ResourceOptions::default(),
    });
    entries.push(ResourceEntry {
        relative_path: AGREEMENT_FILE.to_string(),
        url: urls.agreement,
        options: ResourceOptions::default(),
    });

    Ok(Manifest {
        variant,
        requested: effective_count,
        subjects,
        entries,
    })
}
