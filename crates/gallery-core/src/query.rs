use crate::record::ImageRecord;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortMode {
    #[default]
    Newest,
    Oldest,
    Title,
    Size,
}

impl SortMode {
    /// Unknown mode strings fall back to `Newest`.
    pub fn parse(input: &str) -> Self {
        match input {
            "oldest" => SortMode::Oldest,
            "title" => SortMode::Title,
            "size" => SortMode::Size,
            _ => SortMode::Newest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Newest => "newest",
            SortMode::Oldest => "oldest",
            SortMode::Title => "title",
            SortMode::Size => "size",
        }
    }

    pub fn cycle(&self) -> Self {
        match self {
            SortMode::Newest => SortMode::Oldest,
            SortMode::Oldest => SortMode::Title,
            SortMode::Title => SortMode::Size,
            SortMode::Size => SortMode::Newest,
        }
    }
}

/// Sorting must be stable so that ties keep manifest order; `sort_by` is.
pub fn sort_records(records: &mut [ImageRecord], mode: SortMode) {
    match mode {
        SortMode::Oldest => records.sort_by(|a, b| a.added.cmp(&b.added)),
        SortMode::Title => records.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
        }),
        SortMode::Size => records.sort_by(|a, b| b.bytes.cmp(&a.bytes)),
        SortMode::Newest => records.sort_by(|a, b| b.added.cmp(&a.added)),
    }
}

/// Case-insensitive substring match against title, description, and tags.
/// The query is expected to be lower-cased already; empty matches everything.
pub fn matches_query(record: &ImageRecord, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    let mut haystack = String::new();
    haystack.push_str(&record.title);
    haystack.push(' ');
    haystack.push_str(&record.description);
    for tag in &record.tags {
        haystack.push(' ');
        haystack.push_str(tag);
    }
    haystack.to_lowercase().contains(query)
}

/// Session-scoped derived view over the manifest: records in the active sort
/// order, filtered by the active query.
#[derive(Clone, Debug)]
pub struct GalleryState {
    records: Vec<ImageRecord>,
    query: String,
    sort: SortMode,
}

impl GalleryState {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self::with_sort(records, SortMode::default())
    }

    pub fn with_sort(mut records: Vec<ImageRecord>, sort: SortMode) -> Self {
        sort_records(&mut records, sort);
        Self {
            records,
            query: String::new(),
            sort,
        }
    }

    pub fn set_query(&mut self, raw: &str) {
        self.query = raw.trim().to_lowercase();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn set_sort(&mut self, mode: SortMode) {
        self.sort = mode;
        sort_records(&mut self.records, mode);
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn visible(&self) -> Vec<&ImageRecord> {
        self.records
            .iter()
            .filter(|record| matches_query(record, &self.query))
            .collect()
    }
}
