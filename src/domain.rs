use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OasisError;

pub const LAST_SUBJECT: u16 = 456;

pub const MISSING_SUBJECTS: &[u16] = &[
    8, 24, 36, 48, 89, 93, 100, 118, 128, 149, 154, 171, 172, 175, 187, 194, 196, 215, 219, 225,
    242, 245, 248, 251, 252, 257, 276, 297, 306, 320, 324, 334, 347, 360, 364, 391, 393, 412, 414,
    427, 436,
];

pub const DARTEL_OUTLIERS: &[u16] = &[27, 57, 66, 83, 122, 157, 222, 269, 282, 287, 309, 428];

pub const STANDARD_OUTLIERS: &[u16] = &[390];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Dartel,
    Standard,
}

impl Variant {
    pub fn from_dartel_flag(dartel_version: bool) -> Self {
        if dartel_version {
            Variant::Dartel
        } else {
            Variant::Standard
        }
    }

    pub fn subject_cap(self) -> usize {
        match self {
            Variant::Dartel => 403,
            Variant::Standard => 415,
        }
    }

    pub fn outliers(self) -> &'static [u16] {
        match self {
            Variant::Dartel => DARTEL_OUTLIERS,
            Variant::Standard => STANDARD_OUTLIERS,
        }
    }

    pub fn archive_name(self) -> &'static str {
        match self {
            Variant::Dartel => "archive_dartel.tgz",
            Variant::Standard => "archive.tgz",
        }
    }

    pub fn gray_matter_prefix(self) -> &'static str {
        match self {
            Variant::Dartel => "mwrc1",
            Variant::Standard => "mwc1",
        }
    }

    pub fn white_matter_prefix(self) -> &'static str {
        match self {
            Variant::Dartel => "mwrc2",
            Variant::Standard => "mwc2",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Dartel => write!(f, "dartel"),
            Variant::Standard => write!(f, "standard"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct SubjectId(u16);

impl SubjectId {
    pub fn new(number: u16) -> Result<Self, OasisError> {
        if number == 0 || number > LAST_SUBJECT {
            return Err(OasisError::InvalidSubjectId(number.to_string()));
        }
        Ok(Self(number))
    }

    pub fn number(self) -> u16 {
        self.0
    }

    pub fn session_label(self) -> String {
        format!("OAS1_{self}_MR1")
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl TryFrom<u16> for SubjectId {
    type Error = OasisError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for u16 {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

impl FromStr for SubjectId {
    type Err = OasisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("OAS1_")
            .map(|rest| rest.strip_suffix("_MR1").unwrap_or(rest))
            .unwrap_or(trimmed);
        if digits.len() != 4 || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(OasisError::InvalidSubjectId(value.to_string()));
        }
        let number = digits
            .parse::<u16>()
            .map_err(|_| OasisError::InvalidSubjectId(value.to_string()))?;
        Self::new(number).map_err(|_| OasisError::InvalidSubjectId(value.to_string()))
    }
}
