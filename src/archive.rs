use std::fs;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use zip::ZipArchive;

use crate::error::OasisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    TarGz,
    Tar,
    Zip,
    Gzip,
}

impl ArchiveKind {
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if lower.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else if lower.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if lower.ends_with(".gz") {
            Some(ArchiveKind::Gzip)
        } else {
            None
        }
    }
}

pub fn uncompress(archive_path: &Path, file_name: &str, target_dir: &Path) -> Result<(), OasisError> {
    let kind = ArchiveKind::detect(file_name)
        .ok_or_else(|| OasisError::Archive(format!("unsupported archive format: {file_name}")))?;
    fs::create_dir_all(target_dir).map_err(|err| OasisError::Filesystem(err.to_string()))?;
    match kind {
        ArchiveKind::TarGz => {
            let file = open(archive_path)?;
            extract_tar(GzDecoder::new(file), target_dir)
        }
        ArchiveKind::Tar => extract_tar(open(archive_path)?, target_dir),
        ArchiveKind::Zip => extract_zip(archive_path, target_dir),
        ArchiveKind::Gzip => {
            let stem = &file_name[..file_name.len() - ".gz".len()];
            gunzip(archive_path, &target_dir.join(stem))
        }
    }
}

fn open(path: &Path) -> Result<fs::File, OasisError> {
    fs::File::open(path)
        .map_err(|err| OasisError::Filesystem(format!("open archive {}: {err}", path.display())))
}

pub fn extract_tar<R: io::Read>(reader: R, target_dir: &Path) -> Result<(), OasisError> {
    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|err| OasisError::Archive(err.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| OasisError::Archive(err.to_string()))?;
        let unpacked = entry
            .unpack_in(target_dir)
            .map_err(|err| OasisError::Archive(err.to_string()))?;
        if !unpacked {
            return Err(OasisError::Archive(
                "tar entry path traversal detected".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), OasisError> {
    let file = open(zip_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| OasisError::Archive(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| OasisError::Archive(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(OasisError::Archive(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| OasisError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| OasisError::Archive(err.to_string()))?;
    }
    Ok(())
}

pub fn gunzip(source: &Path, destination: &Path) -> Result<(), OasisError> {
    let mut decoder = GzDecoder::new(open(source)?);
    let mut outfile =
        fs::File::create(destination).map_err(|err| OasisError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut outfile).map_err(|err| OasisError::Archive(err.to_string()))?;
    Ok(())
}
