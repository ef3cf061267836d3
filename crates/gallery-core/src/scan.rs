use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::GalleryError;
use crate::record::{strip_extension, ImageRecord, Manifest};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "avif", "gif"];

#[derive(Debug)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug)]
pub struct ScanReport {
    pub manifest: Manifest,
    pub warnings: Vec<ScanWarning>,
}

pub trait ProgressObserver: Sync {
    fn inc(&self, delta: u64);
}

pub fn list_image_files(img_dir: &Path) -> Result<Vec<(String, PathBuf)>, GalleryError> {
    if !img_dir.is_dir() {
        return Err(GalleryError::Io {
            path: img_dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "image directory missing"),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(img_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(ext) = Path::new(name).extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if !IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            continue;
        }
        files.push((name.to_string(), entry.path().to_path_buf()));
    }

    // Filename order keeps manifest output deterministic across runs.
    files.sort();
    Ok(files)
}

/// Rebuilds the record list from the image directory. Dimensions, byte size,
/// and the content hash come from the files; curated fields are carried over
/// from `previous` keyed by filename.
pub fn scan_images(
    img_dir: &Path,
    previous: &Manifest,
    observer: Option<&dyn ProgressObserver>,
) -> Result<ScanReport, GalleryError> {
    let files = list_image_files(img_dir)?;
    let curated: HashMap<&str, &ImageRecord> = previous
        .records
        .iter()
        .map(|record| (record.file.as_str(), record))
        .collect();

    let results: Vec<Result<(ImageRecord, Option<ScanWarning>), ScanWarning>> = files
        .par_iter()
        .map(|(name, path)| {
            let result = build_record(name, path, curated.get(name.as_str()).copied());
            if let Some(observer) = observer {
                observer.inc(1);
            }
            result
        })
        .collect();

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    for result in results {
        match result {
            Ok((record, warning)) => {
                records.push(record);
                warnings.extend(warning);
            }
            Err(warning) => warnings.push(warning),
        }
    }

    Ok(ScanReport {
        manifest: Manifest::new(records),
        warnings,
    })
}

/// Scan plus full manifest rewrite. A missing or unreadable previous manifest
/// starts from scratch rather than failing.
pub fn generate_manifest(
    img_dir: &Path,
    manifest_path: &Path,
    observer: Option<&dyn ProgressObserver>,
) -> Result<ScanReport, GalleryError> {
    let previous = Manifest::load(manifest_path).unwrap_or_default();
    let report = scan_images(img_dir, &previous, observer)?;
    report.manifest.save(manifest_path)?;
    Ok(report)
}

fn build_record(
    file: &str,
    path: &Path,
    curated: Option<&ImageRecord>,
) -> Result<(ImageRecord, Option<ScanWarning>), ScanWarning> {
    let data = fs::read(path).map_err(|err| ScanWarning {
        path: path.to_path_buf(),
        message: format!("read failed: {err}"),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&data);
    let sha256 = format!("{:x}", hasher.finalize());

    let (dimensions, warning) = match read_dimensions(&data) {
        Ok(dimensions) => (Some(dimensions), None),
        Err(err) => (
            None,
            Some(ScanWarning {
                path: path.to_path_buf(),
                message: format!("dimensions unavailable: {err}"),
            }),
        ),
    };

    let added = curated
        .map(|prev| prev.added)
        .filter(|added| *added != 0)
        .unwrap_or_else(|| mtime_millis(path));

    let ext = Path::new(file)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let record = ImageRecord {
        file: file.to_string(),
        src: format!("img/{}", urlencoding::encode(file)),
        title: curated
            .map(|prev| prev.title.clone())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| title_from_name(file)),
        description: curated.map(|prev| prev.description.clone()).unwrap_or_default(),
        alt: curated.map(|prev| prev.alt.clone()).unwrap_or_default(),
        creator: curated.map(|prev| prev.creator.clone()).unwrap_or_default(),
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
        bytes: data.len() as u64,
        mime: mime_for_extension(&ext).to_string(),
        tags: curated.map(|prev| prev.tags.clone()).unwrap_or_default(),
        added,
        sha256,
    };
    Ok((record, warning))
}

fn read_dimensions(data: &[u8]) -> Result<(u32, u32), image::ImageError> {
    image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .into_dimensions()
}

fn mtime_millis(path: &Path) -> i64 {
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .unwrap_or_else(|_| SystemTime::now());
    modified
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Display title from a filename: extension stripped, `_`/`-` runs become
/// single spaces.
pub fn title_from_name(file: &str) -> String {
    strip_extension(file)
        .split(|ch: char| ch == '_' || ch == '-' || ch.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        _ => "",
    }
}
