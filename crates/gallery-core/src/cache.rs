use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};

use crate::error::GalleryError;

/// Bump whenever the shell asset list changes to force stale-cache eviction.
pub const CACHE_VERSION: &str = "lsa-gallery-v1";

pub const START_PAGE: &str = "/index.html";

/// Enough to render the app shell with zero network access after install.
pub const SHELL_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/assets/style.css",
    "/assets/logo.svg",
    "/data/images.json",
];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchRequest {
    pub path: String,
    /// Top-level page load, as opposed to an asset or data fetch.
    pub navigation: bool,
}

impl FetchRequest {
    pub fn asset(path: &str) -> Self {
        Self {
            path: path.to_string(),
            navigation: false,
        }
    }

    pub fn navigation(path: &str) -> Self {
        Self {
            path: path.to_string(),
            navigation: true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The network side of the agent.
pub trait Origin {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, GalleryError>;
}

/// Named versioned cache buckets.
pub trait CacheStore {
    fn bucket_names(&self) -> Result<Vec<String>, GalleryError>;
    fn delete_bucket(&mut self, bucket: &str) -> Result<(), GalleryError>;
    fn get(&self, bucket: &str, key: &str) -> Result<Option<FetchResponse>, GalleryError>;
    fn put(&mut self, bucket: &str, key: &str, response: &FetchResponse)
        -> Result<(), GalleryError>;
}

impl<S: CacheStore + ?Sized> CacheStore for Box<S> {
    fn bucket_names(&self) -> Result<Vec<String>, GalleryError> {
        (**self).bucket_names()
    }

    fn delete_bucket(&mut self, bucket: &str) -> Result<(), GalleryError> {
        (**self).delete_bucket(bucket)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<FetchResponse>, GalleryError> {
        (**self).get(bucket, key)
    }

    fn put(
        &mut self,
        bucket: &str,
        key: &str,
        response: &FetchResponse,
    ) -> Result<(), GalleryError> {
        (**self).put(bucket, key, response)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestClass {
    Navigation,
    Manifest,
    Asset,
}

pub fn classify(request: &FetchRequest) -> RequestClass {
    if request.navigation {
        RequestClass::Navigation
    } else if request.path.ends_with("/data/images.json") {
        RequestClass::Manifest
    } else {
        RequestClass::Asset
    }
}

/// Intercepts every fetch and applies the per-class policy: navigation and
/// manifest requests are network-first, everything else cache-first. The
/// manifest cache entry is refreshed opportunistically on every successful
/// fetch so offline sessions see the last good copy.
pub struct CacheAgent<S, O> {
    version: String,
    shell_assets: Vec<String>,
    start_page: String,
    store: S,
    origin: O,
}

impl<S: CacheStore, O: Origin> CacheAgent<S, O> {
    pub fn new(store: S, origin: O) -> Self {
        Self::with_version(CACHE_VERSION, store, origin)
    }

    pub fn with_version(version: &str, store: S, origin: O) -> Self {
        Self {
            version: version.to_string(),
            shell_assets: SHELL_ASSETS.iter().map(|asset| asset.to_string()).collect(),
            start_page: START_PAGE.to_string(),
            store,
            origin,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Pre-populates the shell assets. After a successful install the shell
    /// is servable without any origin access.
    pub fn install(&mut self) -> Result<(), GalleryError> {
        let assets = self.shell_assets.clone();
        for asset in assets {
            let response = self.origin.fetch(&FetchRequest::asset(&asset))?;
            if !response.ok() {
                return Err(GalleryError::Cache {
                    message: format!("install failed for {asset}: status {}", response.status),
                });
            }
            self.store.put(&self.version, &asset, &response)?;
        }
        Ok(())
    }

    /// Deletes every bucket from another version; at most one live version.
    pub fn activate(&mut self) -> Result<(), GalleryError> {
        for bucket in self.store.bucket_names()? {
            if bucket != self.version {
                self.store.delete_bucket(&bucket)?;
            }
        }
        Ok(())
    }

    pub fn handle(&mut self, request: &FetchRequest) -> Result<FetchResponse, GalleryError> {
        match classify(request) {
            RequestClass::Navigation => self.navigation_network_first(request),
            RequestClass::Manifest => self.manifest_network_first(request),
            RequestClass::Asset => self.asset_cache_first(request),
        }
    }

    fn navigation_network_first(
        &mut self,
        request: &FetchRequest,
    ) -> Result<FetchResponse, GalleryError> {
        match self.origin.fetch(request) {
            Ok(response) if response.ok() => Ok(response),
            other => match self.store.get(&self.version, &self.start_page)? {
                Some(cached) => Ok(cached),
                None => other,
            },
        }
    }

    fn manifest_network_first(
        &mut self,
        request: &FetchRequest,
    ) -> Result<FetchResponse, GalleryError> {
        match self.origin.fetch(request) {
            Ok(response) if response.ok() => {
                self.store.put(&self.version, &request.path, &response)?;
                Ok(response)
            }
            other => match self.store.get(&self.version, &request.path)? {
                Some(cached) => Ok(cached),
                None => other,
            },
        }
    }

    fn asset_cache_first(&mut self, request: &FetchRequest) -> Result<FetchResponse, GalleryError> {
        if let Some(cached) = self.store.get(&self.version, &request.path)? {
            return Ok(cached);
        }
        let response = self.origin.fetch(request)?;
        if response.ok() {
            self.store.put(&self.version, &request.path, &response)?;
        }
        Ok(response)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    buckets: HashMap<String, HashMap<String, FetchResponse>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn bucket_names(&self) -> Result<Vec<String>, GalleryError> {
        Ok(self.buckets.keys().cloned().collect())
    }

    fn delete_bucket(&mut self, bucket: &str) -> Result<(), GalleryError> {
        self.buckets.remove(bucket);
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<FetchResponse>, GalleryError> {
        Ok(self
            .buckets
            .get(bucket)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn put(
        &mut self,
        bucket: &str,
        key: &str,
        response: &FetchResponse,
    ) -> Result<(), GalleryError> {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }
}

/// Persistent bucket store so the offline copy survives restarts.
pub struct DiskCacheStore {
    path: PathBuf,
    conn: Connection,
}

impl DiskCacheStore {
    pub fn open(path: &Path) -> Result<Self, GalleryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| GalleryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| GalleryError::Database {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                bucket TEXT NOT NULL,
                key TEXT NOT NULL,
                status INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                body BLOB NOT NULL,
                PRIMARY KEY (bucket, key)
            )",
        )
        .map_err(|source| GalleryError::Database {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn open_default() -> Result<Self, GalleryError> {
        let path = xdg::BaseDirectories::with_prefix("lsa-gallery")
            .map_err(|err| GalleryError::Cache {
                message: format!("cannot create cache directory: {err}"),
            })?
            .place_cache_file("offline-cache.sqlite3")
            .map_err(|err| GalleryError::Cache {
                message: format!("cannot create cache directory: {err}"),
            })?;
        Self::open(&path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn db_err(&self, source: rusqlite::Error) -> GalleryError {
        GalleryError::Database {
            path: self.path.clone(),
            source,
        }
    }
}

impl CacheStore for DiskCacheStore {
    fn bucket_names(&self) -> Result<Vec<String>, GalleryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT bucket FROM entries")
            .map_err(|err| self.db_err(err))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|err| self.db_err(err))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| self.db_err(err))?;
        Ok(names)
    }

    fn delete_bucket(&mut self, bucket: &str) -> Result<(), GalleryError> {
        self.conn
            .execute("DELETE FROM entries WHERE bucket = ?1", [bucket])
            .map_err(|err| self.db_err(err))?;
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<FetchResponse>, GalleryError> {
        self.conn
            .query_row(
                "SELECT status, content_type, body FROM entries WHERE bucket = ?1 AND key = ?2",
                [bucket, key],
                |row| {
                    Ok(FetchResponse {
                        status: row.get(0)?,
                        content_type: row.get(1)?,
                        body: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|err| self.db_err(err))
    }

    fn put(
        &mut self,
        bucket: &str,
        key: &str,
        response: &FetchResponse,
    ) -> Result<(), GalleryError> {
        self.conn
            .execute(
                "INSERT INTO entries (bucket, key, status, content_type, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (bucket, key) DO UPDATE SET
                     status = excluded.status,
                     content_type = excluded.content_type,
                     body = excluded.body",
                rusqlite::params![
                    bucket,
                    key,
                    response.status,
                    &response.content_type,
                    &response.body
                ],
            )
            .map_err(|err| self.db_err(err))?;
        Ok(())
    }
}

/// Serves a gallery site checkout from disk as the "network" side. Requests
/// for `/` resolve to the start page; percent-encoded paths are decoded.
pub struct FsOrigin {
    root: PathBuf,
}

impl FsOrigin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Origin for FsOrigin {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, GalleryError> {
        let rel = request.path.trim_start_matches('/');
        let decoded = match urlencoding::decode(rel) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => rel.to_string(),
        };
        if decoded.split('/').any(|part| part == "..") {
            return Err(GalleryError::Fetch {
                path: request.path.clone(),
                message: "path traversal rejected".to_string(),
            });
        }
        let target = if decoded.is_empty() {
            self.root.join("index.html")
        } else {
            self.root.join(&decoded)
        };
        match fs::read(&target) {
            Ok(body) => Ok(FetchResponse {
                status: 200,
                content_type: content_type_for(&target).to_string(),
                body,
            }),
            Err(err) => Err(GalleryError::Fetch {
                path: request.path.clone(),
                message: err.to_string(),
            }),
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("avif") => "image/avif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashMap;

    use super::{
        classify, CacheAgent, CacheStore, FetchRequest, FetchResponse, MemoryCacheStore, Origin,
        RequestClass, START_PAGE,
    };
    use crate::error::GalleryError;

    /// Origin test double: a fixed path→body map plus an offline switch and
    /// a fetch counter.
    struct ScriptedOrigin {
        bodies: HashMap<String, Vec<u8>>,
        online: Cell<bool>,
        fetches: Cell<u32>,
    }

    impl ScriptedOrigin {
        fn new(bodies: &[(&str, &[u8])]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.to_vec()))
                    .collect(),
                online: Cell::new(true),
                fetches: Cell::new(0),
            }
        }
    }

    impl Origin for ScriptedOrigin {
        fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, GalleryError> {
            self.fetches.set(self.fetches.get() + 1);
            if !self.online.get() {
                return Err(GalleryError::Fetch {
                    path: request.path.clone(),
                    message: "offline".to_string(),
                });
            }
            match self.bodies.get(&request.path) {
                Some(body) => Ok(FetchResponse {
                    status: 200,
                    content_type: "application/octet-stream".to_string(),
                    body: body.clone(),
                }),
                None => Ok(FetchResponse {
                    status: 404,
                    content_type: "text/plain".to_string(),
                    body: Vec::new(),
                }),
            }
        }
    }

    fn site() -> ScriptedOrigin {
        ScriptedOrigin::new(&[
            ("/", b"<html>shell</html>".as_slice()),
            ("/index.html", b"<html>shell</html>".as_slice()),
            ("/assets/style.css", b"body{}".as_slice()),
            ("/assets/logo.svg", b"<svg/>".as_slice()),
            ("/data/images.json", b"[{\"file\":\"a.jpg\"}]".as_slice()),
            ("/img/a.jpg", b"jpegbytes".as_slice()),
        ])
    }

    #[test]
    fn classify_splits_request_classes() {
        assert_eq!(
            classify(&FetchRequest::navigation("/")),
            RequestClass::Navigation
        );
        assert_eq!(
            classify(&FetchRequest::asset("/data/images.json")),
            RequestClass::Manifest
        );
        assert_eq!(
            classify(&FetchRequest::asset("/img/a.jpg")),
            RequestClass::Asset
        );
    }

    #[test]
    fn manifest_survives_a_network_failure() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        let request = FetchRequest::asset("/data/images.json");

        let fresh = agent.handle(&request).unwrap();
        agent.origin.online.set(false);
        let stale = agent.handle(&request).unwrap();
        assert_eq!(stale.body, fresh.body);
    }

    #[test]
    fn manifest_refresh_overwrites_the_cached_copy() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        let request = FetchRequest::asset("/data/images.json");
        agent.handle(&request).unwrap();

        agent
            .origin
            .bodies
            .insert("/data/images.json".to_string(), b"[]".to_vec());
        agent.handle(&request).unwrap();

        agent.origin.online.set(false);
        assert_eq!(agent.handle(&request).unwrap().body, b"[]");
    }

    #[test]
    fn manifest_failure_with_no_cache_propagates() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        agent.origin.online.set(false);
        assert!(agent
            .handle(&FetchRequest::asset("/data/images.json"))
            .is_err());
    }

    #[test]
    fn assets_are_cache_first_after_one_fetch() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        let request = FetchRequest::asset("/img/a.jpg");

        agent.handle(&request).unwrap();
        let fetched = agent.origin.fetches.get();
        agent.origin.online.set(false);

        let cached = agent.handle(&request).unwrap();
        assert_eq!(cached.body, b"jpegbytes");
        assert_eq!(agent.origin.fetches.get(), fetched);
    }

    #[test]
    fn asset_miss_offline_fails_observably() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        agent.origin.online.set(false);
        assert!(agent.handle(&FetchRequest::asset("/img/missing.jpg")).is_err());
    }

    #[test]
    fn non_success_asset_responses_are_not_cached() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        let request = FetchRequest::asset("/img/missing.jpg");
        assert_eq!(agent.handle(&request).unwrap().status, 404);

        agent.origin.online.set(false);
        assert!(agent.handle(&request).is_err());
    }

    #[test]
    fn navigation_falls_back_to_the_installed_start_page() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        agent.install().unwrap();
        agent.origin.online.set(false);

        let response = agent.handle(&FetchRequest::navigation("/")).unwrap();
        assert_eq!(response.body, b"<html>shell</html>");
    }

    #[test]
    fn install_then_offline_serves_the_whole_shell() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        agent.install().unwrap();
        agent.origin.online.set(false);

        for asset in super::SHELL_ASSETS {
            if *asset == "/" {
                continue;
            }
            assert!(
                agent.handle(&FetchRequest::asset(asset)).is_ok(),
                "{asset} not servable offline"
            );
        }
    }

    #[test]
    fn activate_evicts_stale_versions_only() {
        let mut store = MemoryCacheStore::new();
        let stale = FetchResponse {
            status: 200,
            content_type: "text/plain".to_string(),
            body: b"old".to_vec(),
        };
        store.put("lsa-gallery-v0", "/index.html", &stale).unwrap();
        store.put("lsa-gallery-v1", "/index.html", &stale).unwrap();

        let mut agent = CacheAgent::with_version("lsa-gallery-v1", store, site());
        agent.activate().unwrap();

        assert!(agent
            .store
            .get("lsa-gallery-v0", "/index.html")
            .unwrap()
            .is_none());
        assert!(agent
            .store
            .get("lsa-gallery-v1", "/index.html")
            .unwrap()
            .is_some());
    }

    #[test]
    fn navigation_without_install_propagates_the_failure() {
        let mut agent = CacheAgent::new(MemoryCacheStore::new(), site());
        agent.origin.online.set(false);
        assert!(agent.handle(&FetchRequest::navigation(START_PAGE)).is_err());
    }
}
