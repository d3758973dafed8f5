//! Block tracking over a stream of control-file lines.
//!
//! The [`BlockTracker`] is a small state machine fed one command at a time.
//! It keeps a stack of open blocks and reports the [`ScopeList`] each line
//! is subject to. Feeding is incremental so callers can splice the lines of
//! an included fragment into the same block context.

use std::fmt;

use crate::command::{BlockToken, Command};
use crate::scope::{Scope, ScopeKind, ScopeList};

/// A command together with the scopes active on its line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// 1-based line number in its source.
    pub line: usize,
    /// The parsed command.
    pub command: Command,
    /// Scopes of the blocks surrounding the line.
    pub scope: ScopeList,
}

/// Structural problems found while tracking blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockIssue {
    /// A block end with no matching start.
    UnmatchedEnd {
        /// 1-based line number.
        line: usize,
        /// Line text.
        text: String,
    },
    /// `ELSE`/`ELSE IF` outside an `IF` block.
    OrphanElse {
        /// 1-based line number.
        line: usize,
        /// Line text.
        text: String,
    },
    /// A block still open at the end of input.
    Unclosed {
        /// 1-based line number of the opening line.
        line: usize,
        /// Opening line text.
        text: String,
    },
}

impl fmt::Display for BlockIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockIssue::UnmatchedEnd { line, text } => {
                write!(f, "line {line}: '{text}' closes a block that was never opened")
            }
            BlockIssue::OrphanElse { line, text } => {
                write!(f, "line {line}: '{text}' is not inside an IF block")
            }
            BlockIssue::Unclosed { line, text } => {
                write!(f, "line {line}: '{text}' is never closed")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    If,
    Define,
    Domain(ScopeKind),
}

#[derive(Debug, Clone)]
struct Frame {
    kind: FrameKind,
    /// Scopes contributed by the current branch.
    scopes: Vec<Scope>,
    /// Positive scopes of the branches already seen in an IF chain.
    prior: Vec<Scope>,
    line: usize,
    text: String,
}

/// Stack of open blocks.
#[derive(Debug, Clone, Default)]
pub struct BlockTracker {
    frames: Vec<Frame>,
    issues: Vec<BlockIssue>,
}

impl BlockTracker {
    /// Creates an empty tracker (global scope).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The scopes of all open blocks.
    #[must_use]
    pub fn current(&self) -> ScopeList {
        ScopeList::new(
            self.frames
                .iter()
                .flat_map(|f| f.scopes.iter().cloned())
                .collect(),
        )
    }

    /// Number of open blocks.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Feeds one command and returns the scope of that line.
    ///
    /// Block delimiters carry the scope of the enclosing block.
    pub fn feed(&mut self, command: &Command, line: usize) -> ScopeList {
        let Some(block) = command.block() else {
            return self.current();
        };
        match block {
            BlockToken::If { kind, names } => {
                let scope = self.current();
                let positive = Scope::parse(*kind, names);
                self.frames.push(Frame {
                    kind: FrameKind::If,
                    scopes: vec![positive.clone()],
                    prior: vec![positive],
                    line,
                    text: command.raw().trim().to_string(),
                });
                scope
            }
            BlockToken::ElseIf { kind, names } => {
                if !matches!(self.frames.last(), Some(f) if f.kind == FrameKind::If) {
                    self.orphan_else(command, line);
                    return self.current();
                }
                let outer = self.current_without_top();
                if let Some(frame) = self.frames.last_mut() {
                    let mut positive = Scope::parse(*kind, names);
                    positive.is_else = true;
                    let mut scopes = vec![positive.clone()];
                    scopes.extend(frame.prior.iter().map(negated_else));
                    frame.scopes = scopes;
                    frame.prior.push(Scope {
                        is_else: false,
                        ..positive
                    });
                }
                outer
            }
            BlockToken::Else => {
                if !matches!(self.frames.last(), Some(f) if f.kind == FrameKind::If) {
                    self.orphan_else(command, line);
                    return self.current();
                }
                let outer = self.current_without_top();
                if let Some(frame) = self.frames.last_mut() {
                    frame.scopes = frame.prior.iter().map(negated_else).collect();
                }
                outer
            }
            BlockToken::EndIf => {
                self.pop(FrameKind::If, command, line);
                self.current()
            }
            BlockToken::Define { kind, name } => {
                let scope = self.current();
                self.frames.push(Frame {
                    kind: FrameKind::Define,
                    scopes: vec![Scope::parse(*kind, name)],
                    prior: Vec::new(),
                    line,
                    text: command.raw().trim().to_string(),
                });
                scope
            }
            BlockToken::EndDefine => {
                self.pop(FrameKind::Define, command, line);
                self.current()
            }
            BlockToken::Start { kind, name } => {
                let scope = self.current();
                self.frames.push(Frame {
                    kind: FrameKind::Domain(*kind),
                    scopes: vec![Scope::parse(*kind, name)],
                    prior: Vec::new(),
                    line,
                    text: command.raw().trim().to_string(),
                });
                scope
            }
            BlockToken::End { kind } => {
                self.pop(FrameKind::Domain(*kind), command, line);
                self.current()
            }
        }
    }

    /// Closes the tracker, reporting blocks that were never closed.
    #[must_use]
    pub fn finish(mut self) -> Vec<BlockIssue> {
        for frame in self.frames.drain(..) {
            self.issues.push(BlockIssue::Unclosed {
                line: frame.line,
                text: frame.text,
            });
        }
        self.issues
    }

    /// Issues found so far.
    #[must_use]
    pub fn issues(&self) -> &[BlockIssue] {
        &self.issues
    }

    fn current_without_top(&self) -> ScopeList {
        let n = self.frames.len().saturating_sub(1);
        ScopeList::new(
            self.frames[..n]
                .iter()
                .flat_map(|f| f.scopes.iter().cloned())
                .collect(),
        )
    }

    fn pop(&mut self, kind: FrameKind, command: &Command, line: usize) {
        match self.frames.iter().rposition(|f| f.kind == kind) {
            Some(pos) => {
                self.frames.remove(pos);
            }
            None => self.issues.push(BlockIssue::UnmatchedEnd {
                line,
                text: command.raw().trim().to_string(),
            }),
        }
    }

    fn orphan_else(&mut self, command: &Command, line: usize) {
        self.issues.push(BlockIssue::OrphanElse {
            line,
            text: command.raw().trim().to_string(),
        });
    }
}

fn negated_else(scope: &Scope) -> Scope {
    let mut negated = scope.as_negated();
    negated.is_else = true;
    negated
}

/// Result of parsing a whole control file.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    /// Every line in order, including blanks and comments.
    pub lines: Vec<ParsedLine>,
    /// Structural problems; never fatal.
    pub issues: Vec<BlockIssue>,
}

/// Parses control-file text line by line.
#[must_use]
pub fn parse(text: &str) -> Parsed {
    let mut tracker = BlockTracker::new();
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let command = Command::parse(raw);
        let scope = tracker.feed(&command, i + 1);
        lines.push(ParsedLine {
            line: i + 1,
            command,
            scope,
        });
    }
    Parsed {
        lines,
        issues: tracker.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Selection;
    use smol_str::SmolStr;

    const IF_ELSE: &str = "If Scenario == D01\n\
                           Read GIS Z Shape == 2d_zsh_D01.shp\n\
                           Else\n\
                           Read GIS Z Shape == 2d_zsh_EXG.shp\n\
                           End If\n";

    fn active<'a>(parsed: &'a Parsed, scenarios: &[&str]) -> Vec<&'a str> {
        let scenarios: Vec<SmolStr> = scenarios.iter().map(|s| SmolStr::new(*s)).collect();
        let selection = Selection {
            scenarios: &scenarios,
            events: &[],
        };
        parsed
            .lines
            .iter()
            .filter(|l| l.command.is_setting() && l.scope.is_active(&selection))
            .map(|l| l.command.rhs())
            .collect()
    }

    #[test]
    fn test_if_else_branches() {
        let parsed = parse(IF_ELSE);
        assert!(parsed.issues.is_empty());
        assert_eq!(active(&parsed, &["D01"]), vec!["2d_zsh_D01.shp"]);
        assert_eq!(active(&parsed, &["D02"]), vec!["2d_zsh_EXG.shp"]);
    }

    #[test]
    fn test_else_if_chain_narrows() {
        let parsed = parse(
            "If Scenario == A\nX == 1\nElse If Scenario == B\nX == 2\nElse\nX == 3\nEnd If\n",
        );
        assert_eq!(active(&parsed, &["A"]), vec!["1"]);
        assert_eq!(active(&parsed, &["B"]), vec!["2"]);
        assert_eq!(active(&parsed, &["A", "B"]), vec!["1"]);
        assert_eq!(active(&parsed, &["C"]), vec!["3"]);
    }

    #[test]
    fn test_nested_blocks() {
        let parsed = parse(
            "If Scenario == A\nIf Event == Q100\nX == 1\nEnd If\nX == 2\nEnd If\nX == 3\n",
        );
        let x1 = &parsed.lines[2];
        assert_eq!(x1.scope.len(), 2);
        let x2 = &parsed.lines[4];
        assert_eq!(x2.scope.len(), 1);
        assert!(parsed.lines[6].scope.is_global());
    }

    #[test]
    fn test_block_lines_take_enclosing_scope() {
        let parsed = parse(IF_ELSE);
        assert!(parsed.lines[0].scope.is_global());
        assert!(parsed.lines[2].scope.is_global());
        assert!(parsed.lines[4].scope.is_global());
    }

    #[test]
    fn test_define_event_scope() {
        let parsed = parse("Define Event == Q100\nBC Event Source == ~ARI~ | 100y\nEnd Define\n");
        let scope = parsed.lines[1].scope.iter().next().unwrap();
        assert_eq!(scope.kind, ScopeKind::EventDefine);
        assert_eq!(scope.names, vec![SmolStr::new("Q100")]);
    }

    #[test]
    fn test_structural_issues_are_reported() {
        let parsed = parse("End If\nIf Scenario == A\nX == 1\n");
        assert_eq!(parsed.issues.len(), 2);
        assert!(matches!(parsed.issues[0], BlockIssue::UnmatchedEnd { line: 1, .. }));
        assert!(matches!(parsed.issues[1], BlockIssue::Unclosed { line: 2, .. }));
    }

    #[test]
    fn test_one_d_domain() {
        let parsed = parse("Start 1D Domain\nTimestep == 1\nEnd 1D Domain\n");
        assert_eq!(
            parsed.lines[1].scope.iter().next().map(|s| s.kind),
            Some(ScopeKind::OneDDomain)
        );
        assert!(parsed.issues.is_empty());
    }
}
