use std::fs;
use std::io;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::error::OasisError;

pub const DATA_DIR_ENV: &str = "OASIS_VBM_DATA_DIR";
pub const DATASET_NAME: &str = "oasis1";

#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
}

impl Store {
    pub fn resolve(data_dir: Option<&Utf8Path>) -> Result<Self, OasisError> {
        if let Some(dir) = data_dir {
            return Ok(Self::new_with_root(dir.to_path_buf()));
        }

        if let Ok(value) = std::env::var(DATA_DIR_ENV)
            && !value.trim().is_empty()
        {
            return Ok(Self::new_with_root(Utf8PathBuf::from(value.trim())));
        }

        let data_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("oasis-vbm")).ok()
            })
            .ok_or_else(|| OasisError::DataDir("unable to resolve home directory".to_string()))?;
        Ok(Self::new_with_root(data_root))
    }

    pub fn new_with_root(data_root: Utf8PathBuf) -> Self {
        Self { data_root }
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn dataset_dir(&self) -> Utf8PathBuf {
        self.data_root.join(DATASET_NAME)
    }

    pub fn target_path(&self, relative_path: &str) -> Utf8PathBuf {
        relative_path
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.dataset_dir(), |path, part| path.join(part))
    }

    pub fn partial_path(&self, file_name: &str) -> Utf8PathBuf {
        self.dataset_dir()
            .join(".partial")
            .join(format!("{file_name}.part"))
    }

    pub fn download_path(&self, file_name: &str) -> Utf8PathBuf {
        self.dataset_dir().join(".downloads").join(file_name)
    }

    pub fn receipt_path(&self, file_name: &str) -> Utf8PathBuf {
        self.dataset_dir()
            .join(".receipts")
            .join(format!("{file_name}.json"))
    }

    pub fn ensure_dataset_dir(&self) -> Result<(), OasisError> {
        fs::create_dir_all(self.dataset_dir().as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))
    }

    pub fn exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    pub fn write_receipt(path: &Utf8Path, receipt: &Receipt) -> Result<(), OasisError> {
        let content = serde_json::to_vec_pretty(receipt)
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn read_receipt(path: &Utf8Path) -> Result<Option<Receipt>, OasisError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        let receipt = serde_json::from_str(&content)
            .map_err(|err| OasisError::Filesystem(format!("receipt {path}: {err}")))?;
        Ok(Some(receipt))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), OasisError> {
        let parent = path
            .parent()
            .ok_or_else(|| OasisError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        let temp = Builder::new()
            .prefix("oasis-vbm-file")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn move_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), OasisError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        }
        rename_or_copy(source.as_std_path(), dest.as_std_path())
            .map_err(|err| OasisError::Filesystem(format!("move {source} to {dest}: {err}")))
    }

    pub fn remove_file_if_exists(path: &Utf8Path) -> Result<(), OasisError> {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(OasisError::Filesystem(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub url: String,
    pub downloaded_at: String,
    pub uncompressed: bool,
    pub size_bytes: u64,
}

fn rename_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_file(to)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
