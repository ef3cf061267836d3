use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::GalleryError;
use crate::query::SortMode;

/// User preferences, read once at startup and rewritten on each change.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub sort: String,
}

impl Preferences {
    pub fn sort_mode(&self) -> SortMode {
        SortMode::parse(&self.sort)
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort = mode.as_str().to_string();
    }

    pub fn load(path: &Path) -> Result<Option<Self>, GalleryError> {
        match fs::read(path) {
            Ok(data) => {
                let prefs = serde_json::from_slice(&data).map_err(|source| GalleryError::Json {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(Some(prefs))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(GalleryError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), GalleryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| GalleryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let data = serde_json::to_vec_pretty(self).map_err(|source| GalleryError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, data).map_err(|source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn default_prefs_path() -> Result<PathBuf, GalleryError> {
    xdg::BaseDirectories::with_prefix("lsa-gallery")
        .map_err(|err| GalleryError::Cache {
            message: format!("cannot create config directory: {err}"),
        })?
        .place_config_file("prefs.json")
        .map_err(|err| GalleryError::Cache {
            message: format!("cannot create config directory: {err}"),
        })
}
