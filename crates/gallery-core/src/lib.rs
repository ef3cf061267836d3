pub mod cache;
pub mod config;
pub mod embed;
pub mod error;
pub mod prefs;
pub mod query;
pub mod record;
pub mod route;
pub mod scan;

pub use cache::{
    classify, CacheAgent, CacheStore, DiskCacheStore, FetchRequest, FetchResponse, FsOrigin,
    MemoryCacheStore, Origin, RequestClass, CACHE_VERSION, SHELL_ASSETS, START_PAGE,
};
pub use config::GalleryConfig;
pub use embed::{
    embed_notice_batch, EmbedReport, EmbedWarning, ExiftoolEmbedder, NoticeEmbedder,
    EMBED_EXTENSIONS, LICENSE_URL, NOTICE,
};
pub use error::GalleryError;
pub use prefs::{default_prefs_path, Preferences};
pub use query::{matches_query, sort_records, GalleryState, SortMode};
pub use record::{image_id, strip_extension, ImageRecord, Manifest};
pub use route::{
    image_url, parse_route, History, LightboxRouter, NavigationEntry, PopOutcome, SessionHistory,
    UrlRoute,
};
pub use scan::{
    generate_manifest, list_image_files, mime_for_extension, scan_images, title_from_name,
    ProgressObserver, ScanReport, ScanWarning, IMAGE_EXTENSIONS,
};
