use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use gallery_core::{
    default_prefs_path, CacheAgent, CacheStore, DiskCacheStore, FetchRequest, FsOrigin,
    GalleryConfig, GalleryState, ImageRecord, LightboxRouter, Manifest, MemoryCacheStore,
    NavigationEntry, PopOutcome, Preferences, SessionHistory,
};
use image::DynamicImage;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui_image::picker::Picker;
use ratatui_image::protocol::StatefulProtocol;
use ratatui_image::{Resize, StatefulImage};

const TICK_RATE: Duration = Duration::from_millis(150);

type Agent = CacheAgent<Box<dyn CacheStore>, FsOrigin>;

#[derive(Parser)]
#[command(name = "gallery-tui", version, about = "Offline-capable TUI browser for the LSA gallery")]
struct Cli {
    /// Gallery site root (contains img/ and data/images.json)
    #[arg(long, short)]
    root: Option<PathBuf>,

    /// Override the offline cache database path
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long)]
    no_cache: bool,

    /// Deep link to open at startup: /image/<id>, /?i=<id>, or a bare id
    #[arg(long)]
    open: Option<String>,

    /// Suppress startup warnings
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum InputMode {
    Normal,
    Search,
}

struct Preview {
    picker: Picker,
    current: Option<String>,
    protocol: Option<StatefulProtocol>,
    last_error: Option<String>,
}

impl Preview {
    fn new(picker: Picker) -> Self {
        Self {
            picker,
            current: None,
            protocol: None,
            last_error: None,
        }
    }

    fn load(&mut self, src: &str, agent: &mut Agent) {
        if self.current.as_deref() == Some(src) {
            return;
        }
        self.current = Some(src.to_string());
        match fetch_image(agent, src) {
            Ok(image) => {
                self.protocol = Some(self.picker.new_resize_protocol(image));
                self.last_error = None;
            }
            Err(err) => {
                self.protocol = None;
                self.last_error = Some(format!("failed to load image: {err}"));
            }
        }
    }
}

/// All media goes through the cache agent: cache-first, so once seen an image
/// keeps rendering with the site root unplugged.
fn fetch_image(agent: &mut Agent, src: &str) -> Result<DynamicImage> {
    let response = agent
        .handle(&FetchRequest::asset(&format!("/{src}")))
        .context("fetch failed")?;
    if !response.ok() {
        return Err(anyhow!("status {}", response.status));
    }
    image::load_from_memory(&response.body).context("unable to decode image")
}

struct App {
    manifest: Manifest,
    gallery: GalleryState,
    router: LightboxRouter,
    history: SessionHistory,
    agent: Agent,
    selected: usize,
    mode: InputMode,
    input_buffer: String,
    status: String,
    preview: Option<Preview>,
    prefs: Preferences,
    prefs_path: Option<PathBuf>,
}

impl App {
    fn new(
        manifest: Manifest,
        agent: Agent,
        router: LightboxRouter,
        history: SessionHistory,
        prefs: Preferences,
        prefs_path: Option<PathBuf>,
    ) -> Self {
        let gallery = GalleryState::with_sort(manifest.records.clone(), prefs.sort_mode());
        Self {
            manifest,
            gallery,
            router,
            history,
            agent,
            selected: 0,
            mode: InputMode::Normal,
            input_buffer: String::new(),
            status: String::from(
                "/ search, o sort, j/k move, Enter open, Esc close, [/] back/forward, q quit",
            ),
            preview: None,
            prefs,
            prefs_path,
        }
    }

    fn visible_files(&self) -> Vec<String> {
        self.gallery
            .visible()
            .iter()
            .map(|record| record.file.clone())
            .collect()
    }

    fn clamp_selection(&mut self) {
        let len = self.gallery.visible().len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.gallery.visible().len() as isize;
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = (self.selected as isize + delta).clamp(0, len - 1);
        self.selected = next as usize;
    }

    fn selected_record(&self) -> Option<&ImageRecord> {
        let files = self.visible_files();
        let file = files.get(self.selected)?;
        self.manifest.get(file)
    }

    /// Record shown in the right pane: the open lightbox image, else the
    /// list selection.
    fn focused_record(&self) -> Option<&ImageRecord> {
        if let Some(id) = self.router.open_id() {
            return self.manifest.find_by_id(id);
        }
        self.selected_record()
    }

    fn open_selected(&mut self) {
        let Some(id) = self.selected_record().map(|record| record.id()) else {
            self.status = "Nothing to open.".to_string();
            return;
        };
        match self.router.open(&self.manifest, &id, &mut self.history) {
            Some(record) => self.status = format!("Open: {}", record.display_title()),
            None => self.status = format!("No record for {id}"),
        }
    }

    fn close_lightbox(&mut self) {
        if self.router.close(&mut self.history) {
            self.status = "Closed.".to_string();
        }
    }

    fn go_back(&mut self) {
        let Some(path) = self.history.back().map(|entry| entry.path.clone()) else {
            self.status = "Already at the oldest entry.".to_string();
            return;
        };
        self.apply_traversal(&path);
    }

    fn go_forward(&mut self) {
        let Some(path) = self.history.forward().map(|entry| entry.path.clone()) else {
            self.status = "Already at the newest entry.".to_string();
            return;
        };
        self.apply_traversal(&path);
    }

    fn apply_traversal(&mut self, path: &str) {
        match self.router.handle_popstate(&self.manifest, path, &mut self.history) {
            PopOutcome::Opened(record) => self.status = format!("Open: {}", record.display_title()),
            PopOutcome::Closed => self.status = "Closed.".to_string(),
            PopOutcome::Unchanged => self.status = format!("At {path}"),
        }
    }

    fn cycle_sort(&mut self) {
        let next = self.gallery.sort().cycle();
        self.gallery.set_sort(next);
        self.clamp_selection();
        self.prefs.set_sort_mode(next);
        if let Some(path) = &self.prefs_path {
            if let Err(err) = self.prefs.save(path) {
                self.status = format!("Sorted by {} (prefs not saved: {err})", next.as_str());
                return;
            }
        }
        self.status = format!("Sorted by {}", next.as_str());
    }

    fn apply_search(&mut self) {
        let raw = self.input_buffer.clone();
        self.gallery.set_query(&raw);
        self.clamp_selection();
        self.status = format!("Filter updated: {} result(s)", self.gallery.visible().len());
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.root.clone() {
        Some(root) => GalleryConfig::with_root(root),
        None => GalleryConfig::default(),
    };

    let store: Box<dyn CacheStore> = if cli.no_cache {
        Box::new(MemoryCacheStore::new())
    } else if let Some(path) = &cli.cache {
        Box::new(DiskCacheStore::open(path).context("failed to open cache")?)
    } else {
        match DiskCacheStore::open_default() {
            Ok(store) => Box::new(store),
            Err(err) => {
                if !cli.quiet {
                    eprintln!("warning: disk cache disabled: {err}");
                }
                Box::new(MemoryCacheStore::new())
            }
        }
    };

    let mut agent = CacheAgent::new(store, FsOrigin::new(config.root.clone()));
    agent.activate().context("cache activation failed")?;
    if let Err(err) = agent.install() {
        if !cli.quiet {
            eprintln!("warning: shell precache incomplete: {err}");
        }
    }

    let manifest = load_manifest(&mut agent, cli.quiet);

    let prefs_path = default_prefs_path().ok();
    let prefs = prefs_path
        .as_deref()
        .and_then(|path| Preferences::load(path).ok().flatten())
        .unwrap_or_default();

    let mut router = LightboxRouter::new("/");
    let mut history = SessionHistory::new(NavigationEntry::base("/"));
    if let Some(target) = &cli.open {
        let (path, query) = deep_link_parts(target);
        history = SessionHistory::new(NavigationEntry {
            path: path.clone(),
            image_id: None,
        });
        router.handle_initial(&manifest, &path, &query, &mut history);
    }

    run_tui(App::new(manifest, agent, router, history, prefs, prefs_path))
}

/// Network-first with offline fallback; a manifest that cannot be fetched or
/// parsed renders an empty gallery rather than aborting.
fn load_manifest(agent: &mut Agent, quiet: bool) -> Manifest {
    match agent.handle(&FetchRequest::asset("/data/images.json")) {
        Ok(response) if response.ok() => {
            match serde_json::from_slice::<Vec<ImageRecord>>(&response.body) {
                Ok(records) => Manifest::new(records),
                Err(err) => {
                    if !quiet {
                        eprintln!("warning: manifest unreadable: {err}");
                    }
                    Manifest::default()
                }
            }
        }
        Ok(response) => {
            if !quiet {
                eprintln!("warning: manifest fetch returned status {}", response.status);
            }
            Manifest::default()
        }
        Err(err) => {
            if !quiet {
                eprintln!("warning: manifest unavailable: {err}");
            }
            Manifest::default()
        }
    }
}

/// `--open` accepts the canonical path form, the legacy query form, or a
/// bare id as shorthand for the canonical form.
fn deep_link_parts(target: &str) -> (String, String) {
    if !target.starts_with('/') && !target.contains('?') {
        return (format!("/image/{target}"), String::new());
    }
    match target.split_once('?') {
        Some((path, query)) => {
            let path = if path.is_empty() { "/" } else { path };
            (path.to_string(), query.to_string())
        }
        None => (target.to_string(), String::new()),
    }
}

fn run_tui(mut app: App) -> Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alt screen")?;
    let picker = Picker::from_query_stdio().unwrap_or_else(|_| Picker::halfblocks());
    app.preview = Some(Preview::new(picker));

    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend).context("failed to init terminal")?;

    let result = run_event_loop(&mut terminal, &mut app);

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    result
}

fn run_event_loop(
    terminal: &mut ratatui::Terminal<ratatui::backend::CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|frame| render_ui(frame, app))?;

        if !event::poll(TICK_RATE)? {
            continue;
        }

        match event::read()? {
            Event::Key(key) => {
                if handle_key_event(app, key) {
                    break;
                }
            }
            Event::Resize(_, _) => {}
            _ => {}
        }
    }

    Ok(())
}

fn handle_key_event(app: &mut App, key: KeyEvent) -> bool {
    match app.mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Search => {
            handle_search_mode(app, key);
            false
        }
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('j') | KeyCode::Down => app.move_selection(1),
        KeyCode::Char('k') | KeyCode::Up => app.move_selection(-1),
        KeyCode::PageDown => app.move_selection(10),
        KeyCode::PageUp => app.move_selection(-10),
        KeyCode::Enter => app.open_selected(),
        KeyCode::Esc => app.close_lightbox(),
        KeyCode::Char('[') | KeyCode::Left => app.go_back(),
        KeyCode::Char(']') | KeyCode::Right => app.go_forward(),
        KeyCode::Char('o') => app.cycle_sort(),
        KeyCode::Char('/') => {
            app.mode = InputMode::Search;
            app.input_buffer = app.gallery.query().to_string();
            app.status = "Search mode: type query and press Enter".to_string();
        }
        _ => {}
    }

    false
}

fn handle_search_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.mode = InputMode::Normal;
            app.input_buffer.clear();
            app.status = "Canceled.".to_string();
        }
        KeyCode::Enter => {
            app.apply_search();
            app.mode = InputMode::Normal;
            app.input_buffer.clear();
        }
        KeyCode::Backspace => {
            app.input_buffer.pop();
        }
        KeyCode::Char(ch) => {
            if !key.modifiers.contains(KeyModifiers::CONTROL) {
                app.input_buffer.push(ch);
            }
        }
        _ => {}
    }
}

fn render_ui(frame: &mut Frame, app: &mut App) {
    let areas = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_search_panel(frame, areas[0], app);
    render_main_panel(frame, areas[1], app);
    render_status(frame, areas[2], app);
}

fn render_search_panel(frame: &mut Frame, area: Rect, app: &App) {
    let label = match app.mode {
        InputMode::Search => format!("Search: {}_", app.input_buffer),
        InputMode::Normal => format!(
            "Search: {}  |  Sort: {}",
            app.gallery.query(),
            app.gallery.sort().as_str()
        ),
    };
    let paragraph =
        Paragraph::new(label).block(Block::default().borders(Borders::ALL).title("Filter"));
    frame.render_widget(paragraph, area);
}

fn render_main_panel(frame: &mut Frame, area: Rect, app: &mut App) {
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    render_list_panel(frame, main[0], app);
    render_detail_and_preview(frame, main[1], app);
}

fn render_list_panel(frame: &mut Frame, area: Rect, app: &App) {
    let visible = app.gallery.visible();
    let total = visible.len();
    let current = if total == 0 { 0 } else { app.selected + 1 };

    let items = visible
        .iter()
        .map(|record| ListItem::new(record.display_title().to_string()))
        .collect::<Vec<_>>();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Images ({current}/{total})")),
        )
        .highlight_symbol("> ")
        .highlight_style(Style::default().add_modifier(Modifier::BOLD));

    let mut state = ListState::default();
    if total != 0 {
        state.select(Some(app.selected));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_detail_and_preview(frame: &mut Frame, area: Rect, app: &mut App) {
    let columns = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let title = if app.router.is_open() {
        format!("Lightbox [{}]", app.history.current().path)
    } else {
        "Detail".to_string()
    };

    let Some((detail_text, src)) = app.focused_record().map(|record| {
        let dims = match (record.width, record.height) {
            (Some(width), Some(height)) => format!("{width}x{height}"),
            _ => "(unknown)".to_string(),
        };
        let tags = if record.tags.is_empty() {
            "(none)".to_string()
        } else {
            record.tags.join(" ")
        };
        let text = format!(
            "File: {}\nTitle: {}\nCreator: {}\nDimensions: {}\nBytes: {}\nTags: {}\n\n{}",
            record.file,
            record.display_title(),
            if record.creator.is_empty() {
                "(none)"
            } else {
                &record.creator
            },
            dims,
            record.bytes,
            tags,
            record.description
        );
        (text, record.src.clone())
    }) else {
        let empty = Paragraph::new("No images.")
            .block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, columns[0]);
        render_preview_panel(frame, columns[1], app, None);
        return;
    };

    let detail = Paragraph::new(detail_text)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, columns[0]);

    render_preview_panel(frame, columns[1], app, Some(src));
}

fn render_preview_panel(frame: &mut Frame, area: Rect, app: &mut App, src: Option<String>) {
    let block = Block::default().borders(Borders::ALL).title("Preview");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(src) = src else {
        frame.render_widget(Paragraph::new("Preview not available."), inner);
        return;
    };

    let Some(preview) = app.preview.as_mut() else {
        frame.render_widget(
            Paragraph::new("Preview backend is not initialized."),
            inner,
        );
        return;
    };

    preview.load(&src, &mut app.agent);
    if let Some(protocol) = preview.protocol.as_mut() {
        frame.render_stateful_widget(
            StatefulImage::default().resize(Resize::Fit(None)),
            inner,
            protocol,
        );
        return;
    }

    let error = preview
        .last_error
        .as_deref()
        .unwrap_or("unknown image decode error");
    let text = Paragraph::new(format!("Preview unavailable: {error}")).wrap(Wrap { trim: false });
    frame.render_widget(text, inner);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let mode = match app.mode {
        InputMode::Normal => "NORMAL",
        InputMode::Search => "SEARCH",
    };
    let status = Paragraph::new(format!(
        "[{mode} | {}] {}",
        app.history.current().path,
        app.status
    ))
    .block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, area);
}

#[cfg(test)]
mod tests {
    use super::deep_link_parts;

    #[test]
    fn deep_link_accepts_all_three_forms() {
        assert_eq!(
            deep_link_parts("/image/dune"),
            ("/image/dune".to_string(), String::new())
        );
        assert_eq!(
            deep_link_parts("/?i=dune"),
            ("/".to_string(), "i=dune".to_string())
        );
        assert_eq!(
            deep_link_parts("dune"),
            ("/image/dune".to_string(), String::new())
        );
    }
}
