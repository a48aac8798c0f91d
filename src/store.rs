use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::Database;
use crate::error::KiraError;

/// Layout of the download directory: archives, their decompressed siblings and
/// the `doc_*` sidecars all live side by side.
#[derive(Debug, Clone)]
pub struct DownloadStore {
    root: Utf8PathBuf,
}

impl DownloadStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), KiraError> {
        fs::create_dir_all(self.root.as_std_path()).map_err(KiraError::fs)
    }

    pub fn archive_path(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(file_name)
    }

    /// `doc_<label>_db_<db>.<ext>`
    pub fn doc_path(&self, label: &str, db: Database, ext: &str) -> Utf8PathBuf {
        self.root.join(format!("doc_{label}_db_{db}.{ext}"))
    }

    pub fn exists(path: &Utf8Path) -> bool {
        path.as_std_path().exists()
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KiraError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path()).map_err(KiraError::fs)?;
        }
        let tmp_path = Utf8PathBuf::from(format!("{path}.tmp"));
        fs::write(tmp_path.as_std_path(), content).map_err(KiraError::fs)?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path()).map_err(KiraError::fs)?;
        Ok(())
    }
}
