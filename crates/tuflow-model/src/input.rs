//! Inputs: one node per control-file line.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use smol_str::SmolStr;
use tuflow_syntax::{Command, FileRef, ScopeList};

use crate::ids::{ChildRef, ControlFileId, InputId};

/// What an input line does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// A plain `Command == Value` setting.
    Setting,
    /// `Set Variable NAME == value`.
    Variable,
    /// `Read GIS ...` vector layers.
    Gis,
    /// `Read GRID ...`/`Read TIN ...` rasters.
    Grid,
    /// Any other file reference.
    File,
    /// A reference to a database file.
    Database,
    /// A reference to another control file.
    ControlFile,
    /// `Read File == fragment.trd`.
    ReadFile,
    /// `BC Event Source`/`BC Event Text`/`BC Event Name`.
    Event,
    /// A comment-only line.
    Comment,
    /// An empty line.
    Blank,
    /// A block delimiter (`If`, `Else`, `End If`, `Define`, ...).
    Block,
    /// A line kept as literal text.
    Unparsed,
}

impl InputKind {
    /// Returns `true` if inputs of this kind reference files.
    #[must_use]
    pub fn references_files(self) -> bool {
        matches!(
            self,
            Self::Gis | Self::Grid | Self::File | Self::Database | Self::ControlFile | Self::ReadFile
        )
    }

    /// Returns `true` for lines that carry a command.
    #[must_use]
    pub fn is_command(self) -> bool {
        !matches!(
            self,
            Self::Comment | Self::Blank | Self::Block | Self::Unparsed
        )
    }

    /// Short lower-case label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Setting => "setting",
            Self::Variable => "variable",
            Self::Gis => "gis",
            Self::Grid => "grid",
            Self::File => "file",
            Self::Database => "database",
            Self::ControlFile => "control-file",
            Self::ReadFile => "read-file",
            Self::Event => "event",
            Self::Comment => "comment",
            Self::Blank => "blank",
            Self::Block => "block",
            Self::Unparsed => "unparsed",
        }
    }
}

/// Where to place a new input relative to a reference input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Directly above the reference.
    Before,
    /// Directly below the reference.
    After,
}

/// A line of a control file in the build-state graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    pub(crate) id: InputId,
    pub(crate) command: Command,
    pub(crate) kind: InputKind,
    pub(crate) scope: ScopeList,
    pub(crate) parent: ControlFileId,
    pub(crate) children: Vec<ChildRef>,
    pub(crate) files: Vec<FileRef>,
    pub(crate) file_scopes: IndexMap<FileRef, ScopeList>,
    pub(crate) attribute_files: Vec<PathBuf>,
    pub(crate) trd_source: Option<PathBuf>,
    pub(crate) has_missing_files: bool,
    pub(crate) dirty: bool,
    pub(crate) line: usize,
}

impl Input {
    pub(crate) fn new(
        id: InputId,
        parent: ControlFileId,
        command: Command,
        kind: InputKind,
        scope: ScopeList,
    ) -> Self {
        Self {
            id,
            command,
            kind,
            scope,
            parent,
            children: Vec::new(),
            files: Vec::new(),
            file_scopes: IndexMap::new(),
            attribute_files: Vec::new(),
            trd_source: None,
            has_missing_files: false,
            dirty: false,
            line: 0,
        }
    }

    /// Stable identity.
    #[must_use]
    pub fn id(&self) -> InputId {
        self.id
    }

    /// The parsed line.
    #[must_use]
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Input kind.
    #[must_use]
    pub fn kind(&self) -> InputKind {
        self.kind
    }

    /// Scopes of the blocks around the line.
    #[must_use]
    pub fn scope(&self) -> &ScopeList {
        &self.scope
    }

    /// Owning control file.
    #[must_use]
    pub fn parent(&self) -> ControlFileId {
        self.parent
    }

    /// Left-hand side as written.
    #[must_use]
    pub fn lhs(&self) -> &str {
        self.command.lhs()
    }

    /// Right-hand side as written.
    #[must_use]
    pub fn rhs(&self) -> &str {
        self.command.rhs()
    }

    /// Upper-case lookup key of the command.
    #[must_use]
    pub fn key(&self) -> SmolStr {
        self.command.key()
    }

    /// Value with quotes and escapes removed. Edit through
    /// [`Model::set_rhs`](crate::Model::set_rhs).
    #[must_use]
    pub fn value(&self) -> String {
        self.command.value()
    }

    /// Control files and databases loaded from this input.
    #[must_use]
    pub fn children(&self) -> &[ChildRef] {
        &self.children
    }

    /// Files the input references, as found on load.
    #[must_use]
    pub fn files(&self) -> &[FileRef] {
        &self.files
    }

    /// Scope each wildcard match was found under.
    #[must_use]
    pub fn file_scopes(&self) -> &IndexMap<FileRef, ScopeList> {
        &self.file_scopes
    }

    /// Files referenced from the attributes of the input's layers.
    #[must_use]
    pub fn attribute_files(&self) -> &[PathBuf] {
        &self.attribute_files
    }

    /// Fragment the line was read from, for `Read File` content.
    #[must_use]
    pub fn trd_source(&self) -> Option<&Path> {
        self.trd_source.as_deref()
    }

    /// Returns `true` if some referenced file could not be found.
    #[must_use]
    pub fn has_missing_files(&self) -> bool {
        self.has_missing_files
    }

    /// Returns `true` if the input was edited since the last write.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 1-based line number in the file it was loaded from; 0 for new inputs.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Comparable content, ignoring load bookkeeping.
    #[must_use]
    pub fn same_content(&self, other: &Input) -> bool {
        self.id == other.id
            && self.command == other.command
            && self.kind == other.kind
            && self.scope == other.scope
            && self.trd_source == other.trd_source
    }
}
