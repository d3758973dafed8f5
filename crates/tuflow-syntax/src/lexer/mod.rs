//! Lexer for TUFLOW control-file lines.
//!
//! This module tokenizes a single control-file line into a stream of tokens
//! with their byte ranges, so the command parser can split it without losing
//! any of the original text.

mod tokens;

pub use tokens::TokenKind;

use logos::Logos;
use text_size::{TextRange, TextSize};

/// A token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The byte range of the token in the source text.
    pub range: TextRange,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub fn new(kind: TokenKind, range: TextRange) -> Self {
        Self { kind, range }
    }

    /// Returns the length of the token in bytes.
    #[must_use]
    pub fn len(&self) -> TextSize {
        self.range.len()
    }

    /// Returns true if the token has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Byte offset where the token starts.
    #[must_use]
    pub fn start(&self) -> usize {
        usize::from(self.range.start())
    }

    /// Byte offset where the token ends.
    #[must_use]
    pub fn end(&self) -> usize {
        usize::from(self.range.end())
    }
}

/// Lexer for control-file text.
///
/// Unrecognised input never stops the lexer; it is returned as
/// `TokenKind::Error` and the caller decides how to degrade.
pub struct Lexer<'src> {
    inner: logos::Lexer<'src, TokenKind>,
    source: &'src str,
}

impl<'src> Lexer<'src> {
    /// Creates a new lexer for the given source text.
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            source,
        }
    }

    /// Returns the source text being lexed.
    #[must_use]
    pub fn source(&self) -> &'src str {
        self.source
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        let kind = self.inner.next()?.unwrap_or(TokenKind::Error);
        let span = self.inner.span();
        let range = TextRange::new(
            TextSize::from(span.start as u32),
            TextSize::from(span.end as u32),
        );
        Some(Token::new(kind, range))
    }
}

/// Lex the entire source and return all tokens.
#[must_use]
pub fn lex(source: &str) -> Vec<Token> {
    Lexer::new(source).collect()
}

/// Lex source and return tokens paired with their text.
///
/// Useful for debugging and testing.
#[must_use]
pub fn lex_with_text(source: &str) -> Vec<(Token, &str)> {
    Lexer::new(source)
        .map(|token| (token, &source[token.start()..token.end()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_basic() {
        let tokens = lex("Cell Size == 5");
        let non_trivia: Vec<_> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
        assert_eq!(non_trivia.len(), 4);
        assert_eq!(non_trivia[2].kind, TokenKind::Assign);
    }

    #[test]
    fn test_lexer_preserves_positions() {
        let tokens = lex("abc == 123");
        assert_eq!(tokens[0].range, TextRange::new(0.into(), 3.into()));
        assert_eq!(tokens[1].range, TextRange::new(3.into(), 4.into()));
        assert_eq!(tokens[2].range, TextRange::new(4.into(), 6.into()));
    }

    #[test]
    fn test_lex_with_text() {
        let tokens = lex_with_text("Read GIS Z Shape == a.shp | b.shp");
        let texts: Vec<_> = tokens
            .iter()
            .filter(|(t, _)| !t.kind.is_trivia())
            .map(|(_, text)| *text)
            .collect();
        assert_eq!(
            texts,
            vec!["Read", "GIS", "Z", "Shape", "==", "a.shp", "|", "b.shp"]
        );
    }
}
