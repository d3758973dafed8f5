//! Model errors.
//!
//! Only failures that stop an operation live here. Data-quality problems in
//! a loaded model (missing files, unparsed lines) are recorded as
//! [`Condition`](crate::conditions::Condition)s instead.

#![allow(missing_docs)]

use std::path::PathBuf;

use smol_str::SmolStr;
use thiserror::Error;

use crate::ids::{ControlFileId, DatabaseId, InputId};

/// Errors raised by model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The root control file requested by the caller does not exist.
    #[error("control file not found: {0}")]
    RootNotFound(PathBuf),

    /// A read file included from another read file.
    #[error("nested read file '{nested}' inside '{fragment}' is not supported")]
    NestedReadFile { fragment: PathBuf, nested: PathBuf },

    /// A singleton command defined in several conditional branches.
    #[error("command '{command}' is defined {count} times in different branches; a run context is required")]
    AmbiguousCommand { command: SmolStr, count: usize },

    /// A file reference still holds a placeholder after substitution.
    #[error("unresolved variable in '{text}' (input {input})")]
    UnresolvedVariable { input: InputId, text: String },

    /// The input id is not part of the model.
    #[error("unknown input {0}")]
    UnknownInput(InputId),

    /// The control file id is not part of the model.
    #[error("unknown control file {0}")]
    UnknownControlFile(ControlFileId),

    /// The database id is not part of the model.
    #[error("unknown database {0}")]
    UnknownDatabase(DatabaseId),

    /// The input does not belong to the given control file.
    #[error("input {input} does not belong to control file {control_file}")]
    NotInControlFile {
        input: InputId,
        control_file: ControlFileId,
    },

    /// `uncomment` called on something that is not a commented-out command.
    #[error("input {0} is not a commented-out command")]
    NotACommentInput(InputId),

    /// `comment_out` called on a comment, blank or block line.
    #[error("input {0} cannot be commented out")]
    AlreadyCommented(InputId),

    /// The text given for a new input is empty or a block delimiter.
    #[error("invalid input text '{0}'")]
    InvalidInputText(String),

    /// No recorded change to undo.
    #[error("nothing to undo")]
    NothingToUndo,

    /// Scope that cannot be expressed as an `If` block.
    #[error("scope '{0}' cannot be assigned to an input")]
    UnsupportedScope(SmolStr),

    /// The database has no entry with this index.
    #[error("database {database} has no entry '{index}'")]
    UnknownEntry { database: DatabaseId, index: SmolStr },

    /// Settings file could not be parsed.
    #[error("invalid settings '{0}'")]
    InvalidSettings(SmolStr),

    /// Underlying I/O failure.
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for model operations.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;
