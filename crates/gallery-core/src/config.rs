use std::path::{Path, PathBuf};

/// Location of a gallery site checkout: `img/` holds the originals,
/// `data/images.json` is the manifest, everything else is the static shell.
#[derive(Clone, Debug)]
pub struct GalleryConfig {
    pub root: PathBuf,
}

impl GalleryConfig {
    pub fn default() -> Self {
        Self {
            root: default_root(),
        }
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root: expand_tilde(&root),
        }
    }

    pub fn img_dir(&self) -> PathBuf {
        self.root.join("img")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("data").join("images.json")
    }
}

pub fn default_root() -> PathBuf {
    PathBuf::from(".")
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if path_str == "~" || path_str.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let suffix = path_str.trim_start_matches('~');
            return home.join(suffix.trim_start_matches('/'));
        }
    }
    path.to_path_buf()
}
