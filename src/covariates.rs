use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::domain::SubjectId;
use crate::error::OasisError;

pub const ID_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CovariatesTable {
    headers: Vec<String>,
    id_column: usize,
    rows: Vec<Vec<String>>,
}

impl CovariatesTable {
    pub fn from_path(path: &Path) -> Result<Self, OasisError> {
        let content = fs::read(path).map_err(|err| {
            OasisError::Filesystem(format!("read covariates {}: {err}", path.display()))
        })?;
        Self::from_reader(content.as_slice())
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, OasisError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|err| OasisError::CovariatesParse(err.to_string()))?
            .iter()
            .map(normalize_header)
            .collect::<Vec<_>>();
        let id_column = headers
            .iter()
            .position(|name| name == ID_COLUMN)
            .ok_or_else(|| OasisError::MissingIdColumn(headers.join(",")))?;

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|err| OasisError::CovariatesParse(err.to_string()))?;
            rows.push(record.iter().map(|field| field.to_string()).collect());
        }

        Ok(Self {
            headers,
            id_column,
            rows,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row[self.id_column].as_str())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&str> {
        let index = self.column_index(name)?;
        self.rows.get(row).map(|fields| fields[index].as_str())
    }

    pub fn filter_subjects(self, subjects: &[SubjectId]) -> Self {
        let labels = subjects
            .iter()
            .map(|subject| subject.session_label())
            .collect::<Vec<_>>();
        let id_column = self.id_column;
        let rows = self
            .rows
            .into_iter()
            .filter(|row| {
                labels
                    .iter()
                    .any(|label| row[id_column].trim().eq_ignore_ascii_case(label))
            })
            .collect();
        Self {
            headers: self.headers,
            id_column,
            rows,
        }
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize_header(name);
        self.headers.iter().position(|header| *header == wanted)
    }
}

pub fn normalize_header(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut pending_separator = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            pending_separator = false;
            normalized.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    normalized
}
