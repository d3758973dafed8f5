//! Control files in the build-state arena.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tuflow_syntax::ScopeList;

use crate::ids::{ControlFileId, InputId};

/// Control file type, taken from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFileKind {
    /// `.tcf`, the root.
    Tcf,
    /// `.tgc` geometry.
    Tgc,
    /// `.tbc` boundary conditions.
    Tbc,
    /// `.ecf` 1D (ESTRY).
    Ecf,
    /// `.tef` event definitions.
    Tef,
    /// `.qcf` quadtree.
    Qcf,
    /// `.toc` operations.
    Toc,
    /// `.trfc` rainfall.
    Trfc,
    /// `.tesf` external stress.
    Tesf,
    /// `.adcf` advection.
    Adcf,
    /// `.tscf` solution.
    Tscf,
    /// Anything else.
    Other,
}

impl ControlFileKind {
    /// Infers the kind from a file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tcf" => Self::Tcf,
            "tgc" => Self::Tgc,
            "tbc" => Self::Tbc,
            "ecf" => Self::Ecf,
            "tef" => Self::Tef,
            "qcf" => Self::Qcf,
            "toc" => Self::Toc,
            "trfc" => Self::Trfc,
            "tesf" => Self::Tesf,
            "adcf" => Self::Adcf,
            "tscf" => Self::Tscf,
            _ => Self::Other,
        }
    }
}

/// Load progress of a control file or database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Created but not read.
    Unloaded,
    /// Being read; children are loading.
    Loading,
    /// Read completely.
    Loaded,
    /// The file does not exist. The node stays as an empty placeholder.
    NotFound,
}

/// Bookkeeping for a `Read File` fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fragment {
    /// The fragment file was found on load.
    pub exists: bool,
    /// Lines from the fragment were edited.
    pub dirty: bool,
}

/// A control file: an ordered list of inputs.
#[derive(Debug, Clone)]
pub struct ControlFile {
    pub(crate) id: ControlFileId,
    pub(crate) path: PathBuf,
    pub(crate) kind: ControlFileKind,
    pub(crate) parent: Option<InputId>,
    pub(crate) scope: ScopeList,
    pub(crate) inputs: Vec<InputId>,
    pub(crate) state: LoadState,
    pub(crate) dirty: bool,
    pub(crate) line_ending: &'static str,
    pub(crate) fragments: IndexMap<PathBuf, Fragment>,
}

impl ControlFile {
    pub(crate) fn new(
        id: ControlFileId,
        path: PathBuf,
        parent: Option<InputId>,
        scope: ScopeList,
    ) -> Self {
        Self {
            id,
            kind: ControlFileKind::from_path(&path),
            path,
            parent,
            scope,
            inputs: Vec::new(),
            state: LoadState::Unloaded,
            dirty: false,
            line_ending: "\n",
            fragments: IndexMap::new(),
        }
    }

    /// Arena id.
    #[must_use]
    pub fn id(&self) -> ControlFileId {
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

    /// File type.
    #[must_use]
    pub fn kind(&self) -> ControlFileKind {
        self.kind
    }

    /// The input this file was loaded from; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<InputId> {
        self.parent
    }

    /// Scope the file is loaded under.
    #[must_use]
    pub fn scope(&self) -> &ScopeList {
        &self.scope
    }

    /// Inputs in file order, including blank, comment and block lines.
    #[must_use]
    pub fn inputs(&self) -> &[InputId] {
        &self.inputs
    }

    /// Load state.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Returns `true` if the file must be written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// `Read File` fragments inlined into this file.
    #[must_use]
    pub fn fragments(&self) -> &IndexMap<PathBuf, Fragment> {
        &self.fragments
    }

    pub(crate) fn position(&self, input: InputId) -> Option<usize> {
        self.inputs.iter().position(|id| *id == input)
    }
}
