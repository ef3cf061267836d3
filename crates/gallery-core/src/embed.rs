use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::GalleryError;
use crate::scan::list_image_files;

pub const LICENSE_URL: &str =
    "https://github.com/ShortTimeNoSee/liberty-sharealike/blob/v1.0/LICENSE";

pub const NOTICE: &str = "Licensed under Liberty-ShareAlike 1.0 (LSA-1.0). If you distribute adaptations, license them under LSA-1.0 and include this full text or a stable link. No attribution required. https://github.com/ShortTimeNoSee/liberty-sharealike/blob/v1.0/LICENSE";

/// Formats exiftool can write XMP into; avif stays untouched.
pub const EMBED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Writes the rights notice into one file's metadata. Narrow seam so tests
/// can substitute a stub for the external tool.
pub trait NoticeEmbedder {
    fn embed_notice(&self, path: &Path) -> Result<(), GalleryError>;
}

/// Production embedder: exiftool, metadata only, pixel data untouched.
pub struct ExiftoolEmbedder {
    program: String,
}

impl ExiftoolEmbedder {
    pub fn new() -> Self {
        Self::with_program("exiftool")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ExiftoolEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeEmbedder for ExiftoolEmbedder {
    fn embed_notice(&self, path: &Path) -> Result<(), GalleryError> {
        let status = Command::new(&self.program)
            .arg("-overwrite_original")
            .arg(format!("-XMP-dc:Rights={NOTICE}"))
            .arg(format!("-XMP-cc:license={LICENSE_URL}"))
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| GalleryError::Tool {
                program: self.program.clone(),
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        if !status.success() {
            return Err(GalleryError::Tool {
                program: self.program.clone(),
                path: path.to_path_buf(),
                message: format!("exit status {status}"),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct EmbedWarning {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct EmbedReport {
    pub embedded: Vec<PathBuf>,
    pub warnings: Vec<EmbedWarning>,
}

/// Runs the embedder over every supported image in the directory. Per-file
/// failures become warnings; the batch always runs to completion. A missing
/// directory is an empty batch, not an error.
pub fn embed_notice_batch(
    embedder: &dyn NoticeEmbedder,
    img_dir: &Path,
) -> Result<EmbedReport, GalleryError> {
    if !img_dir.is_dir() {
        return Ok(EmbedReport::default());
    }

    let mut report = EmbedReport::default();
    for (name, path) in list_image_files(img_dir)? {
        let ext = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if !EMBED_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        match embedder.embed_notice(&path) {
            Ok(()) => report.embedded.push(path),
            Err(err) => report.warnings.push(EmbedWarning {
                path,
                message: err.to_string(),
            }),
        }
    }
    Ok(report)
}
