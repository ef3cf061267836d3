use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GalleryError;

/// One image as described by `data/images.json`. Field names are the wire
/// format and must stay backward compatible; every field except `file`
/// tolerates absence.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRecord {
    pub file: String,
    pub src: String,
    pub title: String,
    pub description: String,
    pub alt: String,
    pub creator: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bytes: u64,
    pub mime: String,
    pub tags: Vec<String>,
    pub added: i64,
    pub sha256: String,
}

impl ImageRecord {
    /// Public URL-safe identifier: filename minus extension, percent-encoded.
    pub fn id(&self) -> String {
        image_id(&self.file)
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.file
        } else {
            &self.title
        }
    }

    pub fn alt_text(&self) -> &str {
        if !self.alt.is_empty() {
            &self.alt
        } else if !self.title.is_empty() {
            &self.title
        } else {
            "image"
        }
    }
}

pub fn image_id(file: &str) -> String {
    urlencoding::encode(strip_extension(file)).into_owned()
}

pub fn strip_extension(file: &str) -> &str {
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    }
}

/// The full ordered record list, loaded once per session and only ever
/// replaced wholesale.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    pub records: Vec<ImageRecord>,
}

impl Manifest {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let data = fs::read(path).map_err(|source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records = serde_json::from_slice(&data).map_err(|source| GalleryError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { records })
    }

    pub fn save(&self, path: &Path) -> Result<(), GalleryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| GalleryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let data =
            serde_json::to_vec_pretty(&self.records).map_err(|source| GalleryError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, data).map_err(|source| GalleryError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, file: &str) -> Option<&ImageRecord> {
        self.records.iter().find(|record| record.file == file)
    }

    /// Resolves a public identifier back to a record. The identifier is
    /// percent-decoded and compared against each candidate's
    /// extension-stripped filename; first match wins.
    pub fn find_by_id(&self, id: &str) -> Option<&ImageRecord> {
        let decoded = match urlencoding::decode(id) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => id.to_string(),
        };
        self.records
            .iter()
            .find(|record| strip_extension(&record.file) == decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::{image_id, strip_extension, ImageRecord, Manifest};

    fn record(file: &str) -> ImageRecord {
        ImageRecord {
            file: file.to_string(),
            ..ImageRecord::default()
        }
    }

    #[test]
    fn id_round_trips_through_lookup() {
        let manifest = Manifest::new(vec![record("winter cabin.jpg"), record("sunset-01.png")]);
        for original in &manifest.records {
            let id = original.id();
            let found = manifest.find_by_id(&id).expect("record should resolve");
            assert_eq!(found.file, original.file);
        }
    }

    #[test]
    fn lookup_takes_first_match_on_duplicate_stems() {
        let manifest = Manifest::new(vec![record("dune.jpg"), record("dune.png")]);
        assert_eq!(manifest.find_by_id("dune").unwrap().file, "dune.jpg");
    }

    #[test]
    fn unknown_id_does_not_resolve() {
        let manifest = Manifest::new(vec![record("dune.jpg")]);
        assert!(manifest.find_by_id("sunset-01").is_none());
    }

    #[test]
    fn strip_extension_keeps_extensionless_names() {
        assert_eq!(strip_extension("photo.final.jpg"), "photo.final");
        assert_eq!(strip_extension("README"), "README");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }

    #[test]
    fn id_percent_encodes_spaces() {
        assert_eq!(image_id("winter cabin.jpg"), "winter%20cabin");
    }

    #[test]
    fn sparse_manifest_json_fills_defaults() {
        let data = br#"[{"file": "a.jpg", "width": null}]"#;
        let records: Vec<ImageRecord> = serde_json::from_slice(data).unwrap();
        assert_eq!(records[0].file, "a.jpg");
        assert_eq!(records[0].width, None);
        assert_eq!(records[0].bytes, 0);
        assert_eq!(records[0].added, 0);
        assert!(records[0].tags.is_empty());
    }

    #[test]
    fn display_title_falls_back_to_filename() {
        let mut rec = record("a.jpg");
        assert_eq!(rec.display_title(), "a.jpg");
        rec.title = "Alpine".to_string();
        assert_eq!(rec.display_title(), "Alpine");
    }
}
