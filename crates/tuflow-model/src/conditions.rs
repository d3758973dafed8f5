//! Non-fatal conditions recorded while loading or editing a model.
//!
//! A large real-world model with some broken references must still load, so
//! data-quality problems are collected here instead of being raised.

use std::fmt;
use std::path::PathBuf;

use smol_str::SmolStr;

use crate::ids::{ControlFileId, InputId};

/// Severity level of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The model is incomplete (e.g. a referenced file is missing).
    Error,
    /// The model loaded, but something looks wrong.
    Warning,
    /// Informational.
    Info,
}

/// A code identifying the type of condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCode {
    /// A referenced file does not exist.
    MissingFile,
    /// A wildcard reference matched no file.
    NoWildcardMatch,
    /// A layer is not present in its spatial database.
    MissingLayer,
    /// A line could not be interpreted and is kept as literal text.
    UnparsedLine,
    /// A block end without a matching start.
    UnmatchedBlockEnd,
    /// An `ELSE` outside an `IF` block.
    OrphanElse,
    /// A block that is never closed.
    UnclosedBlock,
    /// A placeholder scope could not be named.
    UnresolvedScope,
    /// A database file holds binary data.
    BinaryDatabase,
}

impl ConditionCode {
    /// Returns the string code (e.g., "C001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile => "C001",
            Self::NoWildcardMatch => "C002",
            Self::MissingLayer => "C003",
            Self::BinaryDatabase => "C004",
            Self::UnparsedLine => "W001",
            Self::UnmatchedBlockEnd => "W002",
            Self::OrphanElse => "W003",
            Self::UnclosedBlock => "W004",
            Self::UnresolvedScope => "I001",
        }
    }

    /// Returns the default severity for this code.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::MissingFile
            | Self::NoWildcardMatch
            | Self::MissingLayer
            | Self::BinaryDatabase => Severity::Error,
            Self::UnparsedLine
            | Self::UnmatchedBlockEnd
            | Self::OrphanElse
            | Self::UnclosedBlock => Severity::Warning,
            Self::UnresolvedScope => Severity::Info,
        }
    }
}

/// A recorded condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// The condition code.
    pub code: ConditionCode,
    /// The severity level.
    pub severity: Severity,
    /// File the condition was found in.
    pub path: Option<PathBuf>,
    /// Input the condition belongs to, if any.
    pub input: Option<InputId>,
    /// Control file the condition belongs to, for conditions without an input.
    pub control_file: Option<ControlFileId>,
    /// Lower-case index of the database entry the condition belongs to.
    pub entry: Option<SmolStr>,
    /// Human readable message.
    pub message: String,
}

impl Condition {
    /// Creates a condition with the code's default severity.
    pub fn new(code: ConditionCode, message: impl Into<String>) -> Self {
        Self {
            severity: code.severity(),
            code,
            path: None,
            input: None,
            control_file: None,
            entry: None,
            message: message.into(),
        }
    }

    /// Attaches the file the condition was found in.
    #[must_use]
    pub fn in_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attaches the input the condition belongs to.
    #[must_use]
    pub fn for_input(mut self, input: InputId) -> Self {
        self.input = Some(input);
        self
    }

    /// Attaches the control file the condition belongs to.
    #[must_use]
    pub fn in_control_file(mut self, cf: ControlFileId) -> Self {
        self.control_file = Some(cf);
        self
    }

    /// Attaches the database entry the condition belongs to.
    #[must_use]
    pub fn for_entry(mut self, key: impl Into<SmolStr>) -> Self {
        self.entry = Some(key.into());
        self
    }

    /// Returns true if this is an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(f, "{severity}[{}]: {}", self.code.code(), self.message)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}
