//! Configuration of the XDMF store.

use std::path::{Path, PathBuf};

/// Where XDMF descriptors are written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XdmfConfig {
    /// Folder of the `.xmf` files. Defaults to the folder of the store.
    pub xdmf_folder: Option<PathBuf>,
}

impl XdmfConfig {
    /// Descriptors next to the store files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors in `folder`.
    pub fn in_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            xdmf_folder: Some(folder.into()),
        }
    }

    /// Folder used for a store at `prefix`.
    pub fn folder_for(&self, prefix: &Path) -> PathBuf {
        match &self.xdmf_folder {
            Some(f) => f.clone(),
            None => prefix
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}
