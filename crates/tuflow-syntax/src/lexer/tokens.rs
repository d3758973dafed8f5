//! Token definitions for TUFLOW control-file lines.
//!
//! Control files are line oriented and almost free-form, so the token set is
//! small: the `==` assignment, the `|` part separator, the `>>` layer
//! separator, placeholders, quoted strings, comments and runs of plain text.

use logos::Logos;

/// All token kinds that can appear on a control-file line.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u16)]
pub enum TokenKind {
    // =========================================================================
    // TRIVIA
    // =========================================================================
    /// Spaces, tabs and carriage returns.
    #[regex(r"[ \t\r]+")]
    Whitespace,

    /// Line feed.
    #[token("\n")]
    Newline,

    /// Inline or whole-line comment: `! ...` or `# ...`.
    #[regex(r"[!#][^\r\n]*", allow_greedy = true)]
    Comment,

    // =========================================================================
    // PUNCTUATION
    // =========================================================================
    /// `==`, the command/value separator.
    #[token("==")]
    Assign,

    /// `|`, separates the parts of a multi-part value.
    #[token("|")]
    Pipe,

    /// `>>`, separates a spatial database from a layer name.
    #[token(">>")]
    LayerSep,

    // =========================================================================
    // VALUES
    // =========================================================================
    /// Variable or wildcard placeholder: `<<name>>`, `<<~s1~>>`.
    #[regex(r"<<[^<>\r\n]*>>")]
    Placeholder,

    /// Double quoted string.
    #[regex(r#""[^"\r\n]*""#)]
    Quoted,

    /// A comment marker protected by a backslash: `\!` or `\#`.
    #[regex(r"\\[!#]")]
    Escaped,

    /// Any run of characters without special meaning.
    #[regex(r#"[^ \t\r\n=|!#"<>\\]+"#)]
    #[token("=")]
    #[token("<")]
    #[token(">")]
    #[token("\\")]
    Text,

    // =========================================================================
    // SPECIAL
    // =========================================================================
    /// A double quote that is never closed on the same line.
    #[regex(r#""[^"\r\n]*"#)]
    UnterminatedQuote,

    /// Unrecognised input.
    #[default]
    Error,
}

impl TokenKind {
    /// Returns `true` for tokens that carry no value text.
    #[must_use]
    pub fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace | Self::Newline | Self::Comment)
    }

    /// Returns `true` for tokens that make a line impossible to interpret.
    #[must_use]
    pub fn is_malformed(self) -> bool {
        matches!(self, Self::UnterminatedQuote | Self::Error)
    }
}
