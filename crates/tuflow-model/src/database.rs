//! Database files referenced from control files.
//!
//! A database (`bc_dbase.csv`, materials, cross sections) is a delimited
//! table keyed by its first column. A value may be a number, a quoted list of
//! numbers, or a file reference that can vary per event through `~TOKEN~`
//! event sources.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use smol_str::SmolStr;
use tuflow_syntax::{FileRef, ScopeList, Variables};

use crate::control_file::LoadState;
use crate::ids::{DatabaseId, InputId};

const FILE_EXTENSIONS: &[&str] = &[
    "csv", "txt", "ts1", "tmf", "dat", "shp", "gpkg", "mif", "tif", "asc", "flt", "nc", "xml",
];

/// What a database holds, from the command that references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    /// `BC Database`.
    BoundaryConditions,
    /// `Read Materials File`.
    Materials,
    /// `Read Soils File`.
    Soils,
    /// `Pit Inlet Database`/`Pit Database`.
    PitInlet,
    /// `Depth Discharge Database`.
    DepthDischarge,
    /// `XS Database`.
    CrossSection,
    /// `Rainfall Database`.
    Rainfall,
    /// Anything else.
    Other,
}

impl DatabaseKind {
    /// Infers the kind from a normalized command key.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "BC DATABASE" => Self::BoundaryConditions,
            "READ MATERIALS FILE" | "READ MATERIAL FILE" => Self::Materials,
            "READ SOILS FILE" | "READ SOIL FILE" => Self::Soils,
            "PIT INLET DATABASE" | "PIT DATABASE" => Self::PitInlet,
            "DEPTH DISCHARGE DATABASE" => Self::DepthDischarge,
            "XS DATABASE" => Self::CrossSection,
            "RAINFALL DATABASE" => Self::Rainfall,
            _ => Self::Other,
        }
    }
}

/// Layout of a table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Fields separated by a delimiter character.
    Delimited(char),
    /// Fields separated by runs of whitespace (fixed-width style).
    Whitespace,
    /// Not text.
    Binary,
}

impl TableFormat {
    /// Picks a parser from file content.
    ///
    /// A NUL byte in the first kilobyte means binary. Otherwise the first
    /// line that is neither blank nor a comment decides between comma, tab
    /// and whitespace separation.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        let head = &bytes[..bytes.len().min(1024)];
        if head.contains(&0) {
            return Self::Binary;
        }
        let text = String::from_utf8_lossy(head);
        let first = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !is_comment(l));
        match first {
            Some(line) if line.contains(',') => Self::Delimited(','),
            Some(line) if line.contains('\t') => Self::Delimited('\t'),
            Some(_) => Self::Whitespace,
            None => Self::Delimited(','),
        }
    }
}

/// One parsed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    /// Empty cell.
    Empty,
    /// A number.
    Number(f64),
    /// A quoted list of numbers (`"1,0.02,2,0.04"`).
    List(Vec<f64>),
    /// A file reference, as written.
    File(String),
    /// Any other text.
    Text(String),
}

impl EntryValue {
    fn classify(text: &str, quoted: bool) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }
        if let Ok(number) = trimmed.parse::<f64>() {
            return Self::Number(number);
        }
        if quoted && trimmed.contains(',') {
            let numbers: Option<Vec<f64>> = trimmed
                .split(',')
                .map(|p| p.trim().parse::<f64>().ok())
                .collect();
            if let Some(numbers) = numbers {
                return Self::List(numbers);
            }
        }
        if looks_like_file(trimmed) {
            Self::File(trimmed.to_string())
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    /// Returns `true` for list values.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// The file text, for file values.
    #[must_use]
    pub fn as_file(&self) -> Option<&str> {
        match self {
            Self::File(text) => Some(text),
            _ => None,
        }
    }
}

fn looks_like_file(text: &str) -> bool {
    if text.contains('/') || text.contains('\\') {
        return true;
    }
    let lower = text.to_ascii_lowercase();
    lower
        .rsplit_once('.')
        .is_some_and(|(_, ext)| FILE_EXTENSIONS.contains(&ext))
}

fn is_comment(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('#')
}

/// A row of a database.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub(crate) index: SmolStr,
    pub(crate) fields: Vec<String>,
    pub(crate) values: Vec<EntryValue>,
    pub(crate) raw: Option<String>,
    pub(crate) files: Vec<FileRef>,
    pub(crate) file_scopes: IndexMap<FileRef, ScopeList>,
    pub(crate) has_missing_files: bool,
}

impl Entry {
    /// Builds an entry from cell text. The first cell is the index.
    pub fn from_fields<S: AsRef<str>>(index: &str, fields: &[S]) -> Self {
        let parsed = fields
            .iter()
            .map(|f| {
                let text = f.as_ref();
                let quoted = text.contains(',');
                EntryValue::classify(text, quoted)
            })
            .collect();
        Self {
            index: SmolStr::new(index.trim()),
            fields: fields.iter().map(|f| f.as_ref().to_string()).collect(),
            values: parsed,
            raw: None,
            files: Vec::new(),
            file_scopes: IndexMap::new(),
            has_missing_files: false,
        }
    }

    /// Index as written.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Cells after the index.
    #[must_use]
    pub fn values(&self) -> &[EntryValue] {
        &self.values
    }

    /// Returns `true` if some cell holds a list of numbers.
    #[must_use]
    pub fn is_list(&self) -> bool {
        self.values.iter().any(EntryValue::is_list)
    }

    /// Referenced files found on load, one per event variant.
    #[must_use]
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    /// Scope each file variant applies to.
    #[must_use]
    pub fn file_scopes(&self) -> &IndexMap<FileRef, ScopeList> {
        &self.file_scopes
    }

    /// Returns `true` if a referenced file is missing.
    #[must_use]
    pub fn has_missing_files(&self) -> bool {
        self.has_missing_files
    }

    /// File references as written, before event expansion.
    #[must_use]
    pub fn file_templates(&self) -> Vec<&str> {
        self.values.iter().filter_map(EntryValue::as_file).collect()
    }

    fn render(&self, format: TableFormat) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let separator = match format {
            TableFormat::Delimited(c) => c.to_string(),
            _ => " ".to_string(),
        };
        let mut cells = vec![self.index.to_string()];
        for field in &self.fields {
            let needs_quotes = field.contains(separator.as_str())
                || (format == TableFormat::Whitespace && field.contains(' '));
            if needs_quotes {
                cells.push(format!("\"{}\"", field.replace('"', "\"\"")));
            } else {
                cells.push(field.clone());
            }
        }
        cells.join(&separator)
    }
}

/// A line of a database file.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Row {
    /// Header, comment or blank line kept verbatim.
    Text(String),
    /// An entry, by lower-case index.
    Entry(SmolStr),
}

/// A database file.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    pub(crate) id: DatabaseId,
    pub(crate) path: PathBuf,
    pub(crate) kind: DatabaseKind,
    pub(crate) parent: InputId,
    pub(crate) format: TableFormat,
    pub(crate) header: Vec<String>,
    pub(crate) rows: Vec<Row>,
    pub(crate) entries: IndexMap<SmolStr, Entry>,
    pub(crate) state: LoadState,
    pub(crate) dirty: bool,
}

impl Database {
    pub(crate) fn new(id: DatabaseId, path: PathBuf, kind: DatabaseKind, parent: InputId) -> Self {
        Self {
            id,
            path,
            kind,
            parent,
            format: TableFormat::Delimited(','),
            header: Vec::new(),
            rows: Vec::new(),
            entries: IndexMap::new(),
            state: LoadState::Unloaded,
            dirty: false,
        }
    }

    /// Parses table text into the database.
    pub(crate) fn parse(&mut self, text: &str, format: TableFormat) {
        self.format = format;
        self.rows.clear();
        self.entries.clear();
        self.header.clear();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || is_comment(trimmed) {
                self.rows.push(Row::Text(line.to_string()));
                continue;
            }
            let fields = split_fields(line, format);
            if self.header.is_empty() {
                self.header = fields.into_iter().map(|f| f.text).collect();
                self.rows.push(Row::Text(line.to_string()));
                continue;
            }
            let Some((first, rest)) = fields.split_first() else {
                self.rows.push(Row::Text(line.to_string()));
                continue;
            };
            if first.text.trim().is_empty() {
                self.rows.push(Row::Text(line.to_string()));
                continue;
            }
            let entry = Entry {
                index: SmolStr::new(first.text.trim()),
                fields: rest.iter().map(|f| f.text.clone()).collect(),
                values: rest
                    .iter()
                    .map(|f| EntryValue::classify(&f.text, f.quoted))
                    .collect(),
                raw: Some(line.to_string()),
                files: Vec::new(),
                file_scopes: IndexMap::new(),
                has_missing_files: false,
            };
            let key = index_key(&entry.index);
            if self.entries.contains_key(&key) {
                // First definition wins; duplicates are kept as text.
                self.rows.push(Row::Text(line.to_string()));
                continue;
            }
            self.rows.push(Row::Entry(key.clone()));
            self.entries.insert(key, entry);
        }
    }

    /// Arena id.
    #[must_use]
    pub fn id(&self) -> DatabaseId {
        self.id
    }

    /// Current path on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative references resolve against.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Database kind.
    #[must_use]
    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    /// The input that references this database.
    #[must_use]
    pub fn parent(&self) -> InputId {
        self.parent
    }

    /// Detected table layout.
    #[must_use]
    pub fn format(&self) -> TableFormat {
        self.format
    }

    /// Column names.
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Load state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Returns `true` if the database must be written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Case-insensitive entry lookup.
    #[must_use]
    pub fn entry(&self, index: &str) -> Option<&Entry> {
        self.entries.get(&index_key(index))
    }

    /// Entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the database has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Row position of an entry.
    pub(crate) fn row_of(&self, key: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| matches!(r, Row::Entry(k) if k == key))
    }

    /// Text as it will be written.
    #[must_use]
    pub fn render(&self, line_ending: &str) -> String {
        let mut out = String::new();
        for row in &self.rows {
            match row {
                Row::Text(text) => out.push_str(text),
                Row::Entry(key) => {
                    if let Some(entry) = self.entries.get(key) {
                        out.push_str(&entry.render(self.format));
                    }
                }
            }
            out.push_str(line_ending);
        }
        out
    }
}

/// Lookup key of an entry index.
#[must_use]
pub fn index_key(index: &str) -> SmolStr {
    SmolStr::new(index.trim().to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    text: String,
    quoted: bool,
}

fn split_fields(line: &str, format: TableFormat) -> Vec<Field> {
    let is_separator = |c: char| match format {
        TableFormat::Delimited(d) => c == d,
        _ => c.is_whitespace(),
    };
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
            continue;
        }
        if c == '"' {
            in_quotes = true;
            quoted = true;
        } else if is_separator(c) {
            if format == TableFormat::Whitespace && current.is_empty() && !quoted {
                continue;
            }
            fields.push(Field {
                text: current.trim().to_string(),
                quoted,
            });
            current.clear();
            quoted = false;
        } else {
            current.push(c);
        }
    }
    if !(format == TableFormat::Whitespace && current.is_empty() && !quoted) {
        fields.push(Field {
            text: current.trim().to_string(),
            quoted,
        });
    }
    fields
}

/// Event source values from `Define Event` blocks.
///
/// Each event assigns values to one or more `~TOKEN~` sources; tokens are
/// stored upper-case with their tildes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDatabase {
    events: IndexMap<SmolStr, Variables>,
}

impl EventDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `event` sets `token` to `value`.
    pub fn insert(&mut self, event: &str, token: &str, value: &str) {
        let name = self
            .events
            .keys()
            .find(|k| k.eq_ignore_ascii_case(event))
            .cloned()
            .unwrap_or_else(|| SmolStr::new(event.trim()));
        self.events
            .entry(name)
            .or_default()
            .insert(normalize_token(token), SmolStr::new(value.trim()));
    }

    /// Returns `true` if no event is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event names in definition order.
    pub fn events(&self) -> impl Iterator<Item = &SmolStr> {
        self.events.keys()
    }

    /// Sources set by one event.
    #[must_use]
    pub fn sources(&self, event: &str) -> Option<&Variables> {
        self.events
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(event))
            .map(|(_, sources)| sources)
    }

    /// Every value each token takes, in definition order.
    #[must_use]
    pub fn token_values(&self) -> IndexMap<SmolStr, Vec<SmolStr>> {
        let mut out: IndexMap<SmolStr, Vec<SmolStr>> = IndexMap::new();
        for sources in self.events.values() {
            for (token, value) in sources {
                let values = out.entry(token.clone()).or_default();
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        out
    }

    /// The event that sets `token` to `value`.
    #[must_use]
    pub fn event_for(&self, token: &str, value: &str) -> Option<&SmolStr> {
        let token = normalize_token(token);
        self.events.iter().find_map(|(name, sources)| {
            sources
                .get(&token)
                .filter(|v| v.eq_ignore_ascii_case(value))
                .map(|_| name)
        })
    }

    /// Tokens that occur in `text`, case-insensitive.
    #[must_use]
    pub fn tokens_in(&self, text: &str) -> Vec<SmolStr> {
        let upper = text.to_ascii_uppercase();
        self.token_values()
            .into_keys()
            .filter(|token| upper.contains(token.as_str()))
            .collect()
    }

    /// Every assignment of values to all tokens.
    #[must_use]
    pub fn combinations(&self) -> Combinations {
        Combinations::new(self.token_values().into_iter().collect())
    }

    /// Every assignment of values to the given tokens.
    #[must_use]
    pub fn combinations_over(&self, tokens: &[SmolStr]) -> Combinations {
        let values = self.token_values();
        let axes = tokens
            .iter()
            .map(|t| {
                let token = normalize_token(t);
                let options = values.get(&token).cloned().unwrap_or_default();
                (token, options)
            })
            .collect();
        Combinations::new(axes)
    }
}

fn normalize_token(token: &str) -> SmolStr {
    SmolStr::new(token.trim().to_ascii_uppercase())
}

/// Lazy Cartesian product over event token values.
///
/// Yields nothing when there are no tokens or some token has no value.
#[derive(Debug, Clone)]
pub struct Combinations {
    axes: Vec<(SmolStr, Vec<SmolStr>)>,
    choice: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(axes: Vec<(SmolStr, Vec<SmolStr>)>) -> Self {
        let done = axes.is_empty() || axes.iter().any(|(_, values)| values.is_empty());
        Self {
            choice: vec![0; axes.len()],
            axes,
            done,
        }
    }

    /// Number of combinations, without iterating.
    #[must_use]
    pub fn total(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, values)| values.len()).product()
    }
}

impl Iterator for Combinations {
    type Item = Variables;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self
            .axes
            .iter()
            .zip(&self.choice)
            .map(|((token, values), idx)| (token.clone(), values[*idx].clone()))
            .collect();
        self.done = true;
        for (slot, (_, values)) in self.choice.iter_mut().zip(&self.axes).rev() {
            *slot += 1;
            if *slot < values.len() {
                self.done = false;
                break;
            }
            *slot = 0;
        }
        Some(item)
    }
}

impl fmt::Display for EntryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::List(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "\"{}\"", parts.join(","))
            }
            Self::File(text) | Self::Text(text) => f.write_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BC_DBASE: &str = "Name,Source,Column 1,Column 2\n\
                            ! inflows\n\
                            FC01,inflow_~ARI~_~DUR~.csv,Time,Q\n\
                            DS,0.5,,\n";

    fn database(text: &str) -> Database {
        let mut db = Database::new(
            DatabaseId(0),
            PathBuf::from("/model/bc_dbase.csv"),
            DatabaseKind::BoundaryConditions,
            InputId(0),
        );
        db.parse(text, TableFormat::sniff(text.as_bytes()));
        db
    }

    #[test]
    fn test_parse_entries() {
        let db = database(BC_DBASE);
        assert_eq!(db.header(), ["Name", "Source", "Column 1", "Column 2"]);
        assert_eq!(db.len(), 2);
        let fc01 = db.entry("fc01").unwrap();
        assert_eq!(fc01.file_templates(), vec!["inflow_~ARI~_~DUR~.csv"]);
        assert_eq!(db.entry("DS").unwrap().values()[0], EntryValue::Number(0.5));
    }

    #[test]
    fn test_quoted_numeric_list_is_list() {
        let db = database("ID,n\n1,\"1,0.02,2,0.04\"\n2,0.03\n");
        let entry = db.entry("1").unwrap();
        assert!(entry.is_list());
        assert!(entry.file_templates().is_empty());
        assert_eq!(entry.values()[0], EntryValue::List(vec![1.0, 0.02, 2.0, 0.04]));
        assert!(!db.entry("2").unwrap().is_list());
    }

    #[test]
    fn test_render_keeps_unedited_rows() {
        let db = database(BC_DBASE);
        assert_eq!(db.render("\n"), BC_DBASE);
    }

    #[test]
    fn test_render_edited_entry_quotes_lists() {
        let mut db = database("ID,n\n1,0.03\n");
        let entry = Entry::from_fields("1", &["1,0.02,2,0.04"]);
        assert!(entry.is_list());
        db.entries.insert(index_key("1"), entry);
        assert_eq!(db.render("\n"), "ID,n\n1,\"1,0.02,2,0.04\"\n");
    }

    #[test]
    fn test_sniff() {
        assert_eq!(TableFormat::sniff(b"! c\nA,B\n"), TableFormat::Delimited(','));
        assert_eq!(TableFormat::sniff(b"A\tB\n"), TableFormat::Delimited('\t'));
        assert_eq!(TableFormat::sniff(b"1.0  2.0\n"), TableFormat::Whitespace);
        assert_eq!(TableFormat::sniff(b"\x00\x01bin"), TableFormat::Binary);
    }

    #[test]
    fn test_whitespace_fields() {
        let fields = split_fields("  1   \"a b\"  3 ", TableFormat::Whitespace);
        let texts: Vec<&str> = fields.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "a b", "3"]);
    }

    #[test]
    fn test_event_combinations_are_lazy_product() {
        let mut events = EventDatabase::new();
        events.insert("Q100", "~ARI~", "100y");
        events.insert("Q010", "~ari~", "10y");
        events.insert("2h", "~DUR~", "2h");
        events.insert("6h", "~DUR~", "6h");
        let combos = events.combinations();
        assert_eq!(combos.total(), 4);
        let all: Vec<Variables> = combos.collect();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0]["~ARI~"], "100y");
        assert_eq!(all[0]["~DUR~"], "2h");
        assert_eq!(all[3]["~ARI~"], "10y");
        assert_eq!(all[3]["~DUR~"], "6h");
        assert_eq!(events.event_for("~DUR~", "6H").map(SmolStr::as_str), Some("6h"));
        assert_eq!(events.tokens_in("inflow_~ari~.csv"), vec![SmolStr::new("~ARI~")]);
        assert_eq!(events.combinations_over(&[SmolStr::new("~ARI~")]).count(), 2);
        assert_eq!(EventDatabase::new().combinations().count(), 0);
    }
}
