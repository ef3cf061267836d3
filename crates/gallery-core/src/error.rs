use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum GalleryError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("database error on {path}: {source}")]
    Database {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("cache error: {message}")]
    Cache { message: String },
    #[error("fetch failed for {path}: {message}")]
    Fetch { path: String, message: String },
    #[error("{program} failed on {path}: {message}")]
    Tool {
        program: String,
        path: PathBuf,
        message: String,
    },
}
