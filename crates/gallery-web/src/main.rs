use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use askama::Template;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use gallery_core::{
    image_url, GalleryConfig, GalleryState, ImageRecord, Manifest, SortMode, LICENSE_URL, NOTICE,
};
use serde::Deserialize;
use tokio::signal;

const SITE_TITLE: &str = "LSA Gallery — liberty • share • remix";

#[derive(Parser, Debug)]
#[command(
    name = "gallery-web",
    version,
    about = "Read-only web front-end for the LSA gallery"
)]
struct Cli {
    /// Gallery site root (contains img/ and data/images.json)
    #[arg(long, short)]
    root: Option<PathBuf>,

    /// Bind host (default localhost only)
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[derive(Clone)]
struct AppState {
    manifest: Arc<Manifest>,
    config: Arc<GalleryConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct IndexParams {
    q: Option<String>,
    sort: Option<String>,
    /// Legacy deep-link forms, normalized to `/image/<id>` on arrival.
    i: Option<String>,
    image: Option<String>,
}

#[derive(Clone, Debug)]
struct CardItem {
    href: String,
    src: String,
    alt: String,
    title: String,
    dims: String,
    size: String,
    creator: String,
    tags: Vec<TagLink>,
}

#[derive(Clone, Debug)]
struct TagLink {
    label: String,
    href: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    site_title: &'static str,
    query: String,
    sort: &'static str,
    total: usize,
    shown: usize,
    cards: Vec<CardItem>,
}

#[derive(Template)]
#[template(path = "image.html")]
struct ImageTemplate {
    page_title: String,
    title: String,
    description: String,
    creator: String,
    file: String,
    src: String,
    alt: String,
    dims: String,
    size: String,
    mime: String,
    tags: Vec<TagLink>,
    license_url: &'static str,
    notice: &'static str,
    json_ld: String,
}

struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(content) => Html(content).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to render template: {err}"),
            )
                .into_response(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gallery_web=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.root {
        Some(root) => GalleryConfig::with_root(root),
        None => GalleryConfig::default(),
    };

    // A broken or missing manifest renders a zero-state, never a crash.
    let manifest_path = config.manifest_path();
    let manifest = match Manifest::load(&manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => {
            tracing::warn!("manifest unavailable, serving empty gallery: {err}");
            Manifest::default()
        }
    };
    tracing::info!("loaded {} records from {}", manifest.len(), manifest_path.display());

    let state = AppState {
        manifest: Arc::new(manifest),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/image/:id", get(image_handler))
        .route("/img/:file", get(media_handler))
        .route("/assets/:file", get(asset_handler))
        .route("/data/images.json", get(manifest_handler))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .context("invalid bind host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    tracing::info!("gallery-web listening on http://{local_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server exited with error")?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}

async fn index_handler(
    State(state): State<AppState>,
    Query(params): Query<IndexParams>,
) -> Response {
    // Legacy `?i=` / `?image=` deep links get one normalized redirect; an
    // unresolved id goes back to the base path instead of a dead link.
    if let Some(id) = params.i.as_deref().or(params.image.as_deref()) {
        return match state.manifest.find_by_id(id) {
            Some(record) => Redirect::to(&image_url("/", &record.id())).into_response(),
            None => Redirect::temporary("/").into_response(),
        };
    }

    let sort = SortMode::parse(params.sort.as_deref().unwrap_or("newest"));
    let mut gallery = GalleryState::with_sort(state.manifest.records.clone(), sort);
    gallery.set_query(params.q.as_deref().unwrap_or(""));

    let cards = gallery
        .visible()
        .into_iter()
        .map(to_card)
        .collect::<Vec<_>>();

    HtmlTemplate(IndexTemplate {
        site_title: SITE_TITLE,
        query: gallery.query().to_string(),
        sort: sort.as_str(),
        total: gallery.records().len(),
        shown: cards.len(),
        cards,
    })
    .into_response()
}

async fn image_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    // Axum decodes the path segment; re-encode so lookups and canonical URLs
    // see the wire form.
    let id = urlencoding::encode(&id).into_owned();
    let Some(record) = state.manifest.find_by_id(&id) else {
        return Redirect::temporary("/").into_response();
    };

    HtmlTemplate(ImageTemplate {
        page_title: format!("{} - LSA Gallery", record.display_title()),
        title: record.display_title().to_string(),
        description: record.description.clone(),
        creator: record.creator.clone(),
        file: record.file.clone(),
        src: format!("/{}", record.src),
        alt: record.alt_text().to_string(),
        dims: dims_label(record),
        size: human_bytes(record.bytes),
        mime: record.mime.clone(),
        tags: tag_links(&record.tags),
        license_url: LICENSE_URL,
        notice: NOTICE,
        json_ld: json_ld_for(record),
    })
    .into_response()
}

async fn media_handler(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    serve_file(state.config.img_dir(), &file).await
}

async fn asset_handler(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    serve_file(state.config.root.join("assets"), &file).await
}

async fn serve_file(dir: PathBuf, file: &str) -> Response {
    if file.contains('/') || file.contains("..") {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    let path = dir.join(file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            let mut response = Response::new(Body::from(bytes));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(mime.as_ref())
                    .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
            );
            response
        }
        Err(_) => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn manifest_handler(State(state): State<AppState>) -> Response {
    match serde_json::to_vec_pretty(&state.manifest.records) {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to serialize manifest: {err}"),
        )
            .into_response(),
    }
}

fn to_card(record: &ImageRecord) -> CardItem {
    CardItem {
        href: image_url("/", &record.id()),
        src: format!("/{}", record.src),
        alt: record.alt_text().to_string(),
        title: record.display_title().to_string(),
        dims: dims_label(record),
        size: human_bytes(record.bytes),
        creator: record.creator.clone(),
        tags: tag_links(&record.tags),
    }
}

fn tag_links(tags: &[String]) -> Vec<TagLink> {
    tags.iter()
        .map(|tag| TagLink {
            href: format!("/?q={}", urlencoding::encode(tag)),
            label: tag.clone(),
        })
        .collect()
}

fn dims_label(record: &ImageRecord) -> String {
    match (record.width, record.height) {
        (Some(width), Some(height)) => format!("{width}×{height}"),
        _ => String::new(),
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value < 10.0 && unit > 0 {
        format!("{value:.1} {}", UNITS[unit])
    } else {
        format!("{value:.0} {}", UNITS[unit])
    }
}

fn json_ld_for(record: &ImageRecord) -> String {
    let mut value = serde_json::json!({
        "@context": "https://schema.org",
        "@type": "ImageObject",
        "name": record.display_title(),
        "contentUrl": format!("/{}", record.src),
        "thumbnail": format!("/{}", record.src),
        "description": record.description,
        "width": record.width,
        "height": record.height,
        "encodingFormat": record.mime,
        "license": LICENSE_URL,
    });
    if !record.creator.is_empty() {
        value["creator"] = serde_json::json!({
            "@type": "Person",
            "name": record.creator,
        });
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use gallery_core::ImageRecord;

    use super::{human_bytes, json_ld_for, tag_links};

    #[test]
    fn human_bytes_matches_display_rules() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KB");
        assert_eq!(human_bytes(150_000), "146 KB");
        assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn tag_links_percent_encode_queries() {
        let links = tag_links(&["golden hour".to_string()]);
        assert_eq!(links[0].href, "/?q=golden%20hour");
        assert_eq!(links[0].label, "golden hour");
    }

    #[test]
    fn json_ld_includes_creator_only_when_present() {
        let mut record = ImageRecord {
            file: "a.jpg".to_string(),
            src: "img/a.jpg".to_string(),
            ..ImageRecord::default()
        };
        assert!(!json_ld_for(&record).contains("creator"));
        record.creator = "Alice".to_string();
        assert!(json_ld_for(&record).contains("\"name\":\"Alice\""));
    }
}
