use crate::record::{image_id, ImageRecord, Manifest};

/// One browser-style history record: a URL path plus the image id it carries,
/// if any. Pushed on every state-changing navigation, consumed on traversal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NavigationEntry {
    pub path: String,
    pub image_id: Option<String>,
}

impl NavigationEntry {
    pub fn base(base: &str) -> Self {
        Self {
            path: base.to_string(),
            image_id: None,
        }
    }

    pub fn image(base: &str, id: &str) -> Self {
        Self {
            path: image_url(base, id),
            image_id: Some(id.to_string()),
        }
    }
}

pub fn image_url(base: &str, id: &str) -> String {
    format!("{base}image/{id}")
}

/// Where history entries go. The lightbox router never mutates history more
/// than once per transition.
pub trait History {
    fn push(&mut self, entry: NavigationEntry);
    fn replace(&mut self, entry: NavigationEntry);
}

/// The state a URL asks for. `Legacy` is the old `?i=`/`?image=` deep-link
/// form, still accepted on read and normalized to the canonical path on open.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UrlRoute {
    Base,
    Image(String),
    Legacy(String),
}

/// Single routing function shared by initial-load and traversal handling:
/// maps a URL (path plus raw query string) to the state it asks for.
pub fn parse_route(base: &str, path: &str, query: &str) -> UrlRoute {
    if let Some(rest) = path.strip_prefix(base) {
        if let Some(id) = rest.strip_prefix("image/") {
            if !id.is_empty() {
                return UrlRoute::Image(id.to_string());
            }
        }
    }
    if let Some(id) = query_param(query, &["i", "image"]) {
        return UrlRoute::Legacy(id);
    }
    UrlRoute::Base
}

/// First non-empty value among `keys`, left as written in the URL (values are
/// decoded during record resolution, not here).
fn query_param(query: &str, keys: &[&str]) -> Option<String> {
    let query = query.trim_start_matches('?');
    for key in keys {
        for pair in query.split('&') {
            if let Some((name, value)) = pair.split_once('=') {
                if name == *key && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Outcome of a back/forward traversal.
#[derive(Debug, Eq, PartialEq)]
pub enum PopOutcome<'m> {
    Opened(&'m ImageRecord),
    Closed,
    Unchanged,
}

/// Synchronizes the single "currently open image" slot with history and URL
/// path, independent of how the gallery itself is filtered or sorted.
#[derive(Clone, Debug)]
pub struct LightboxRouter {
    base: String,
    open_id: Option<String>,
}

impl LightboxRouter {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            base,
            open_id: None,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn open_id(&self) -> Option<&str> {
        self.open_id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open_id.is_some()
    }

    /// User opens an image: resolve, push one canonical entry. Opening an
    /// unknown id is a no-op.
    pub fn open<'m>(
        &mut self,
        manifest: &'m Manifest,
        id: &str,
        history: &mut dyn History,
    ) -> Option<&'m ImageRecord> {
        let record = manifest.find_by_id(id)?;
        let canonical = image_id(&record.file);
        history.push(NavigationEntry::image(&self.base, &canonical));
        self.open_id = Some(canonical);
        Some(record)
    }

    /// User closes the lightbox: push one base entry. Returns false if the
    /// lightbox was not open.
    pub fn close(&mut self, history: &mut dyn History) -> bool {
        if self.open_id.take().is_none() {
            return false;
        }
        history.push(NavigationEntry::base(&self.base));
        true
    }

    /// Startup routing. A canonical image path opens in place (the existing
    /// history entry already represents this URL, so zero mutations); the
    /// legacy query form opens with one push of the normalized entry; an
    /// unresolved id never leaves a dangling deep link: one replace to base.
    pub fn handle_initial<'m>(
        &mut self,
        manifest: &'m Manifest,
        path: &str,
        query: &str,
        history: &mut dyn History,
    ) -> Option<&'m ImageRecord> {
        match parse_route(&self.base, path, query) {
            UrlRoute::Image(id) => match manifest.find_by_id(&id) {
                Some(record) => {
                    self.open_id = Some(image_id(&record.file));
                    Some(record)
                }
                None => {
                    history.replace(NavigationEntry::base(&self.base));
                    None
                }
            },
            UrlRoute::Legacy(id) => match manifest.find_by_id(&id) {
                Some(record) => {
                    let canonical = image_id(&record.file);
                    history.push(NavigationEntry::image(&self.base, &canonical));
                    self.open_id = Some(canonical);
                    Some(record)
                }
                None => {
                    history.replace(NavigationEntry::base(&self.base));
                    None
                }
            },
            UrlRoute::Base => None,
        }
    }

    /// Back/forward traversal. The target state derives from the URL alone,
    /// never from a stored state payload; traversal itself must not push.
    pub fn handle_popstate<'m>(
        &mut self,
        manifest: &'m Manifest,
        path: &str,
        history: &mut dyn History,
    ) -> PopOutcome<'m> {
        match parse_route(&self.base, path, "") {
            UrlRoute::Image(id) => match manifest.find_by_id(&id) {
                Some(record) if self.open_id.is_none() => {
                    self.open_id = Some(image_id(&record.file));
                    PopOutcome::Opened(record)
                }
                Some(_) => PopOutcome::Unchanged,
                None => {
                    history.replace(NavigationEntry::base(&self.base));
                    PopOutcome::Unchanged
                }
            },
            _ => {
                if self.open_id.take().is_some() {
                    PopOutcome::Closed
                } else {
                    PopOutcome::Unchanged
                }
            }
        }
    }
}

/// A browser-like session history: an entry list with a cursor. Pushing
/// truncates the forward tail; traversal moves the cursor and hands back the
/// entry whose URL is then fed through `handle_popstate`.
#[derive(Clone, Debug)]
pub struct SessionHistory {
    entries: Vec<NavigationEntry>,
    index: usize,
}

impl SessionHistory {
    pub fn new(initial: NavigationEntry) -> Self {
        Self {
            entries: vec![initial],
            index: 0,
        }
    }

    pub fn current(&self) -> &NavigationEntry {
        &self.entries[self.index]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn back(&mut self) -> Option<&NavigationEntry> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(&self.entries[self.index])
    }

    pub fn forward(&mut self) -> Option<&NavigationEntry> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(&self.entries[self.index])
    }
}

impl History for SessionHistory {
    fn push(&mut self, entry: NavigationEntry) {
        self.entries.truncate(self.index + 1);
        self.entries.push(entry);
        self.index += 1;
    }

    fn replace(&mut self, entry: NavigationEntry) {
        self.entries[self.index] = entry;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse_route, History, LightboxRouter, NavigationEntry, PopOutcome, SessionHistory,
        UrlRoute,
    };
    use crate::record::{ImageRecord, Manifest};

    #[derive(Debug, Eq, PartialEq)]
    enum Op {
        Push(NavigationEntry),
        Replace(NavigationEntry),
    }

    #[derive(Debug, Default)]
    struct RecordingHistory {
        ops: Vec<Op>,
    }

    impl History for RecordingHistory {
        fn push(&mut self, entry: NavigationEntry) {
            self.ops.push(Op::Push(entry));
        }

        fn replace(&mut self, entry: NavigationEntry) {
            self.ops.push(Op::Replace(entry));
        }
    }

    fn manifest() -> Manifest {
        Manifest::new(vec![
            ImageRecord {
                file: "winter cabin.jpg".to_string(),
                title: "Winter Cabin".to_string(),
                ..ImageRecord::default()
            },
            ImageRecord {
                file: "dune.png".to_string(),
                ..ImageRecord::default()
            },
        ])
    }

    #[test]
    fn parse_route_recognizes_canonical_and_legacy_forms() {
        assert_eq!(
            parse_route("/", "/image/dune", ""),
            UrlRoute::Image("dune".to_string())
        );
        assert_eq!(
            parse_route("/g/", "/g/image/dune", ""),
            UrlRoute::Image("dune".to_string())
        );
        assert_eq!(
            parse_route("/", "/", "i=dune"),
            UrlRoute::Legacy("dune".to_string())
        );
        assert_eq!(
            parse_route("/", "/", "?image=dune"),
            UrlRoute::Legacy("dune".to_string())
        );
        assert_eq!(parse_route("/", "/", ""), UrlRoute::Base);
        assert_eq!(parse_route("/", "/about", ""), UrlRoute::Base);
        // An image path outside the base prefix is not an image route.
        assert_eq!(parse_route("/g/", "/image/dune", ""), UrlRoute::Base);
    }

    #[test]
    fn open_pushes_exactly_one_entry() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        let record = router.open(&manifest, "dune", &mut history).unwrap();
        assert_eq!(record.file, "dune.png");
        assert!(router.is_open());
        assert_eq!(
            history.ops,
            vec![Op::Push(NavigationEntry::image("/", "dune"))]
        );
    }

    #[test]
    fn open_unknown_id_is_a_no_op() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        assert!(router.open(&manifest, "missing", &mut history).is_none());
        assert!(!router.is_open());
        assert!(history.ops.is_empty());
    }

    #[test]
    fn close_pushes_exactly_one_base_entry() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");
        router.open(&manifest, "dune", &mut history).unwrap();

        assert!(router.close(&mut history));
        assert!(!router.is_open());
        assert_eq!(history.ops.len(), 2);
        assert_eq!(history.ops[1], Op::Push(NavigationEntry::base("/")));

        // Closing again does nothing.
        assert!(!router.close(&mut history));
        assert_eq!(history.ops.len(), 2);
    }

    #[test]
    fn open_encodes_the_canonical_id() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        router.open(&manifest, "winter%20cabin", &mut history).unwrap();
        assert_eq!(router.open_id(), Some("winter%20cabin"));
        assert_eq!(
            history.ops,
            vec![Op::Push(NavigationEntry::image("/", "winter%20cabin"))]
        );
    }

    #[test]
    fn initial_canonical_path_opens_without_touching_history() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        let record = router
            .handle_initial(&manifest, "/image/dune", "", &mut history)
            .unwrap();
        assert_eq!(record.file, "dune.png");
        assert!(router.is_open());
        assert!(history.ops.is_empty());
    }

    #[test]
    fn initial_unknown_path_replaces_with_base() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        assert!(router
            .handle_initial(&manifest, "/image/sunset-01", "", &mut history)
            .is_none());
        assert!(!router.is_open());
        assert_eq!(history.ops, vec![Op::Replace(NavigationEntry::base("/"))]);
    }

    // The legacy query form pushes a normalized entry where the canonical
    // path form does not. The asymmetry is deliberate and kept visible here.
    #[test]
    fn initial_legacy_query_pushes_a_normalized_entry() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        let record = router
            .handle_initial(&manifest, "/", "i=dune", &mut history)
            .unwrap();
        assert_eq!(record.file, "dune.png");
        assert_eq!(
            history.ops,
            vec![Op::Push(NavigationEntry::image("/", "dune"))]
        );
    }

    #[test]
    fn initial_legacy_unknown_replaces_with_base() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        assert!(router
            .handle_initial(&manifest, "/", "image=missing", &mut history)
            .is_none());
        assert_eq!(history.ops, vec![Op::Replace(NavigationEntry::base("/"))]);
    }

    #[test]
    fn popstate_to_image_opens_without_pushing() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        match router.handle_popstate(&manifest, "/image/dune", &mut history) {
            PopOutcome::Opened(record) => assert_eq!(record.file, "dune.png"),
            other => panic!("expected open, got {other:?}"),
        }
        assert!(history.ops.is_empty());
    }

    #[test]
    fn popstate_while_open_leaves_state_alone() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");
        router.open(&manifest, "dune", &mut history).unwrap();
        history.ops.clear();

        let outcome = router.handle_popstate(&manifest, "/image/winter%20cabin", &mut history);
        assert_eq!(outcome, PopOutcome::Unchanged);
        assert_eq!(router.open_id(), Some("dune"));
        assert!(history.ops.is_empty());
    }

    #[test]
    fn popstate_unknown_image_replaces_with_base() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");

        let outcome = router.handle_popstate(&manifest, "/image/missing", &mut history);
        assert_eq!(outcome, PopOutcome::Unchanged);
        assert_eq!(history.ops, vec![Op::Replace(NavigationEntry::base("/"))]);
    }

    #[test]
    fn popstate_to_base_closes_without_pushing() {
        let manifest = manifest();
        let mut history = RecordingHistory::default();
        let mut router = LightboxRouter::new("/");
        router.open(&manifest, "dune", &mut history).unwrap();
        history.ops.clear();

        let outcome = router.handle_popstate(&manifest, "/", &mut history);
        assert_eq!(outcome, PopOutcome::Closed);
        assert!(!router.is_open());
        assert!(history.ops.is_empty());
    }

    // Pressing back after opening an image returns to the base path and
    // closes the lightbox without growing the history.
    #[test]
    fn back_after_open_closes_and_keeps_history_length() {
        let manifest = manifest();
        let mut history = SessionHistory::new(NavigationEntry::base("/"));
        let mut router = LightboxRouter::new("/");

        router.open(&manifest, "dune", &mut history).unwrap();
        assert_eq!(history.len(), 2);

        let path = history.back().expect("one entry behind").path.clone();
        let outcome = router.handle_popstate(&manifest, &path, &mut history);
        assert_eq!(outcome, PopOutcome::Closed);
        assert_eq!(history.len(), 2);
        assert_eq!(history.current().path, "/");
    }

    #[test]
    fn forward_after_back_reopens_the_image() {
        let manifest = manifest();
        let mut history = SessionHistory::new(NavigationEntry::base("/"));
        let mut router = LightboxRouter::new("/");

        router.open(&manifest, "dune", &mut history).unwrap();
        let back = history.back().unwrap().path.clone();
        router.handle_popstate(&manifest, &back, &mut history);

        let forward = history.forward().unwrap().path.clone();
        match router.handle_popstate(&manifest, &forward, &mut history) {
            PopOutcome::Opened(record) => assert_eq!(record.file, "dune.png"),
            other => panic!("expected reopen, got {other:?}"),
        }
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn push_truncates_the_forward_tail() {
        let mut history = SessionHistory::new(NavigationEntry::base("/"));
        history.push(NavigationEntry::image("/", "a"));
        history.push(NavigationEntry::image("/", "b"));
        history.back();
        history.push(NavigationEntry::image("/", "c"));
        assert_eq!(history.len(), 3);
        assert_eq!(history.current().path, "/image/c");
        assert!(history.forward().is_none());
    }
}
