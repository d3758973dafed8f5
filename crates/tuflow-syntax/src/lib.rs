//! `tuflow-syntax` - Lexer, command parser and scope model for TUFLOW control files.
//!
//! This crate provides the text-level layer of the control-file model:
//!
//! - **Lexer**: Tokenizes a control-file line (`logos` based)
//! - **Command**: Splits a line into command, value parts and comment
//! - **Parser**: Tracks `IF`/`ELSE`/`DEFINE` blocks and assigns scopes
//! - **Scope**: Scenario/event membership and its matching rules
//! - **Expand**: `<<variable>>` substitution and wildcard handling
//!
//! # Design Principles
//!
//! - **Lossless**: Unedited lines keep their original text, including
//!   indentation and comments
//! - **Error-tolerant**: Lines that cannot be interpreted are kept as
//!   literal text and structural problems are reported, never raised
//! - **No I/O**: Paths are handled lexically; the file system belongs to
//!   `tuflow-model`
//!
//! # Example
//!
//! ```
//! use tuflow_syntax::{parse, Command};
//!
//! let parsed = parse("If Scenario == D01\nCell Size == 2\nEnd If\n");
//! assert_eq!(parsed.lines.len(), 3);
//! assert_eq!(parsed.lines[1].command.lhs(), "Cell Size");
//! assert!(!parsed.lines[1].scope.is_global());
//!
//! let cmd = Command::parse("Read GIS Z Shape == a.shp | b.shp ! zones");
//! assert_eq!(cmd.rhs_parts().len(), 2);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod expand;
pub mod lexer;
pub mod parser;
pub mod reference;
pub mod scope;

pub use command::{
    normalize_key, value_parts, BlockToken, Command, LineKind, PartKind, ValuePart,
};
pub use expand::{
    expand, expand_event_tokens, extract_names_from_pattern, globify, has_placeholders,
    paths_match, placeholders, PlaceholderKind, Variables, Wildcards,
};
pub use lexer::{lex, Lexer, Token, TokenKind};
pub use parser::{parse, BlockIssue, BlockTracker, Parsed, ParsedLine};
pub use reference::FileRef;
pub use scope::{resolve_scope, Scope, ScopeKind, ScopeList, Selection};
