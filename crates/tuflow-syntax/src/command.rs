//! Parsed representation of one control-file line.
//!
//! A line is `Command == Value [| Value2 ...] [! comment]`, a block
//! delimiter (`If Scenario == D01`, `End If`, `Define Event == Q100`, ...), a
//! comment, or blank. The original text is kept verbatim so unedited lines
//! are written back byte for byte.

use smol_str::SmolStr;

use crate::lexer::{lex, Token, TokenKind};
use crate::reference::{unquote, FileRef};
use crate::scope::ScopeKind;

/// Value words that are never file references.
const KEYWORDS: &[&str] = &[
    "ON", "OFF", "YES", "NO", "TRUE", "FALSE", "AUTO", "DEFAULT", "NONE", "ALL", "GPKG", "SHP",
    "MIF", "TAB", "TIF", "ASC", "FLT", "NC", "GRID", "TIN", "HPC", "CLASSIC", "GPU", "CPU",
    "SP", "DP", "METRIC", "US CUSTOMARY", "MAXIMUM", "MINIMUM", "ADD", "MAX", "MIN", "REPLACE",
];

/// Extensions that mark a value part as a file.
const FILE_EXTENSIONS: &[&str] = &[
    "tcf", "tgc", "tbc", "ecf", "tef", "qcf", "toc", "trfc", "tesf", "adcf", "tscf", "trd",
    "shp", "mif", "mid", "gpkg", "tab", "csv", "txt", "ts1", "tmf", "tif", "tiff", "asc",
    "flt", "nc", "dem", "12da", "xml", "inp", "dat",
];

/// Classification of a whole line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Empty or whitespace only.
    Blank,
    /// Only a comment.
    Comment,
    /// A `Command [== Value]` line.
    Setting,
    /// A conditional/definition block delimiter.
    Block(BlockToken),
    /// A line the lexer could not interpret; kept as literal text.
    Unparsed,
}

/// Structural tokens that open or close blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockToken {
    /// `IF SCENARIO == a | b` or `IF EVENT == a | b`.
    If {
        /// Scenario or event.
        kind: ScopeKind,
        /// Raw OR list.
        names: String,
    },
    /// `ELSE IF SCENARIO == ...`
    ElseIf {
        /// Scenario or event.
        kind: ScopeKind,
        /// Raw OR list.
        names: String,
    },
    /// `ELSE`
    Else,
    /// `END IF`
    EndIf,
    /// `DEFINE <kind> [== name]`
    Define {
        /// Event definition, output zone or generic control block.
        kind: ScopeKind,
        /// Block name (may be empty).
        name: String,
    },
    /// `END DEFINE`
    EndDefine,
    /// `START 1D DOMAIN` / `START 2D DOMAIN [== name]`
    Start {
        /// 1D domain or generic control block.
        kind: ScopeKind,
        /// Block name (may be empty).
        name: String,
    },
    /// `END 1D DOMAIN` / `END 2D DOMAIN`
    End {
        /// Kind of the block being closed.
        kind: ScopeKind,
    },
}

/// What a part of a multi-part value looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    /// Parses as a number.
    Number,
    /// Looks like a file (known extension, path separator or layer syntax).
    File,
    /// A reserved value word such as `ON` or `GPKG`.
    Keyword,
    /// Anything else; may still be a bare layer name.
    Text,
}

/// One `|`-separated part of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePart {
    /// Part text with quotes and escapes removed.
    pub text: String,
    /// Heuristic classification.
    pub kind: PartKind,
}

impl ValuePart {
    fn classify(text: String) -> Self {
        let kind = classify_part(&text);
        Self { text, kind }
    }

    /// Returns `true` if the part can name a file or layer.
    #[must_use]
    pub fn could_be_file(&self) -> bool {
        matches!(self.kind, PartKind::File | PartKind::Text)
    }
}

/// A parsed control-file line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    raw: String,
    indent: String,
    lhs: String,
    rhs: String,
    comment: Option<String>,
    comment_gap: String,
    kind: LineKind,
    malformed: bool,
}

impl Command {
    /// Parses a single line. Never fails; see [`LineKind::Unparsed`].
    #[must_use]
    pub fn parse(line: &str) -> Command {
        let line = line.trim_end_matches(['\n', '\r']);
        let indent_len = line.len() - line.trim_start().len();
        let indent = line[..indent_len].to_string();
        let tokens = lex(line);

        if tokens.iter().any(|t| t.kind.is_malformed()) {
            return Command {
                raw: line.to_string(),
                indent,
                lhs: String::new(),
                rhs: String::new(),
                comment: None,
                comment_gap: String::new(),
                kind: LineKind::Unparsed,
                malformed: true,
            };
        }

        let comment_at = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Comment)
            .map(Token::start);
        let (body, comment) = match comment_at {
            Some(pos) => (&line[..pos], Some(line[pos..].trim_end().to_string())),
            None => (line, None),
        };
        let comment_gap = if comment.is_some() {
            body[body.trim_end().len()..].to_string()
        } else {
            String::new()
        };

        let assign = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Assign && comment_at.is_none_or(|c| t.start() < c));
        let (lhs, rhs) = match assign {
            Some(tok) => (
                body[..tok.start()].trim().to_string(),
                body[tok.end()..].trim().to_string(),
            ),
            None => (body.trim().to_string(), String::new()),
        };

        let kind = if lhs.is_empty() && rhs.is_empty() {
            if comment.is_some() {
                LineKind::Comment
            } else {
                LineKind::Blank
            }
        } else {
            match classify_block(&lhs, &rhs) {
                Some(block) => LineKind::Block(block),
                None => LineKind::Setting,
            }
        };

        Command {
            raw: line.to_string(),
            indent,
            lhs,
            rhs,
            comment,
            comment_gap,
            kind,
            malformed: false,
        }
    }

    /// A blank line.
    #[must_use]
    pub fn blank() -> Command {
        Command::parse("")
    }

    /// The line as it will be written.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Leading whitespace.
    #[must_use]
    pub fn indent(&self) -> &str {
        &self.indent
    }

    /// Left-hand side as written.
    #[must_use]
    pub fn lhs(&self) -> &str {
        &self.lhs
    }

    /// Right-hand side as written (quotes and escapes kept).
    #[must_use]
    pub fn rhs(&self) -> &str {
        &self.rhs
    }

    /// Comment text including its `!`/`#` marker.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Line classification.
    #[must_use]
    pub fn kind(&self) -> &LineKind {
        &self.kind
    }

    /// Returns `true` if the lexer rejected the line.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.malformed
    }

    /// Block token, for structural lines.
    #[must_use]
    pub fn block(&self) -> Option<&BlockToken> {
        match &self.kind {
            LineKind::Block(block) => Some(block),
            _ => None,
        }
    }

    /// Returns `true` for block delimiters.
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self.kind, LineKind::Block(_))
    }

    /// Returns `true` for comment-only lines.
    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.kind == LineKind::Comment
    }

    /// Returns `true` for blank lines.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.kind == LineKind::Blank
    }

    /// Returns `true` for `Command == Value` style lines.
    #[must_use]
    pub fn is_setting(&self) -> bool {
        self.kind == LineKind::Setting
    }

    /// Upper-case left-hand side with single spaces, used for lookups.
    #[must_use]
    pub fn key(&self) -> SmolStr {
        normalize_key(&self.lhs)
    }

    /// The value with quotes and escapes removed.
    #[must_use]
    pub fn value(&self) -> String {
        unescape(unquote(&self.rhs))
    }

    /// Splits the value on `|` and classifies each part.
    ///
    /// OGR style `|layername=` suffixes stay attached to their database.
    #[must_use]
    pub fn rhs_parts(&self) -> Vec<ValuePart> {
        value_parts(&self.rhs)
    }

    /// Replaces the command name and re-renders the line.
    pub fn set_lhs(&mut self, lhs: &str) {
        let updated = self.rendered(lhs.trim(), &self.rhs, self.comment.as_deref());
        *self = Command::parse(&updated);
    }

    /// Replaces the value and re-renders the line.
    pub fn set_rhs(&mut self, rhs: &str) {
        let updated = self.rendered(&self.lhs, rhs.trim(), self.comment.as_deref());
        *self = Command::parse(&updated);
    }

    /// Replaces (or removes) the inline comment and re-renders the line.
    pub fn set_comment(&mut self, comment: Option<&str>) {
        let comment = comment.map(|c| {
            let c = c.trim();
            if c.starts_with('!') || c.starts_with('#') {
                c.to_string()
            } else {
                format!("! {c}")
            }
        });
        if self.comment_gap.is_empty() {
            self.comment_gap = " ".to_string();
        }
        let updated = self.rendered(&self.lhs, &self.rhs, comment.as_deref());
        *self = Command::parse(&updated);
    }

    fn rendered(&self, lhs: &str, rhs: &str, comment: Option<&str>) -> String {
        let mut out = String::with_capacity(self.raw.len() + rhs.len());
        out.push_str(&self.indent);
        out.push_str(lhs);
        if !rhs.is_empty() {
            out.push_str(" == ");
            out.push_str(rhs);
        }
        if let Some(comment) = comment {
            if !lhs.is_empty() || !rhs.is_empty() {
                let gap = if self.comment_gap.is_empty() {
                    " "
                } else {
                    &self.comment_gap
                };
                out.push_str(gap);
            }
            out.push_str(comment);
        }
        out
    }

    /// The line turned into a comment (`! ` prefix, indentation kept).
    #[must_use]
    pub fn commented(&self) -> Command {
        Command::parse(&format!("{}! {}", self.indent, self.raw.trim_start()))
    }

    /// The inverse of [`Command::commented`] for comment lines.
    #[must_use]
    pub fn uncommented(&self) -> Option<Command> {
        if !self.is_comment() {
            return None;
        }
        let text = self.comment.as_deref()?;
        let text = text.strip_prefix(['!', '#']).unwrap_or(text);
        let text = text.strip_prefix(' ').unwrap_or(text);
        Some(Command::parse(&format!("{}{text}", self.indent)))
    }

    /// Name set by `Set Variable NAME == value`.
    #[must_use]
    pub fn variable_name(&self) -> Option<SmolStr> {
        if !self.key().starts_with("SET VARIABLE ") {
            return None;
        }
        let name = self
            .lhs
            .split_whitespace()
            .skip(2)
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then(|| SmolStr::new(name))
    }

    /// Returns `true` for `Set Variable` lines.
    #[must_use]
    pub fn is_variable_set(&self) -> bool {
        self.is_setting() && self.variable_name().is_some()
    }

    /// Token and value of `BC Event Source == ~TOKEN~ | value`.
    #[must_use]
    pub fn event_source(&self) -> Option<(SmolStr, SmolStr)> {
        if !self.is_setting() || self.key() != "BC EVENT SOURCE" {
            return None;
        }
        let parts = self.rhs_parts();
        let token = parts.first()?.text.trim().to_ascii_uppercase();
        let value = parts.get(1).map(|p| p.text.trim()).unwrap_or_default();
        if token.is_empty() {
            return None;
        }
        Some((SmolStr::new(token), SmolStr::new(value)))
    }

    /// Returns `true` for `BC Event Source` lines.
    #[must_use]
    pub fn is_event_source(&self) -> bool {
        self.event_source().is_some()
    }
}

/// Upper-case with single spaces.
#[must_use]
pub fn normalize_key(text: &str) -> SmolStr {
    let words: Vec<&str> = text.split_whitespace().collect();
    SmolStr::new(words.join(" ").to_ascii_uppercase())
}

/// Splits value text on `|` and classifies each part.
#[must_use]
pub fn value_parts(rhs: &str) -> Vec<ValuePart> {
    split_parts(rhs).into_iter().map(ValuePart::classify).collect()
}

fn unescape(text: &str) -> String {
    text.replace("\\!", "!").replace("\\#", "#")
}

fn split_parts(rhs: &str) -> Vec<String> {
    if rhs.trim().is_empty() {
        return Vec::new();
    }
    let mut raw_parts: Vec<&str> = Vec::new();
    let mut last = 0;
    for token in lex(rhs) {
        if token.kind == TokenKind::Pipe {
            raw_parts.push(&rhs[last..token.start()]);
            last = token.end();
        }
    }
    raw_parts.push(&rhs[last..]);

    let mut parts: Vec<String> = Vec::new();
    for part in raw_parts {
        let text = unescape(unquote(part.trim()));
        if text.to_ascii_lowercase().starts_with("layername=") {
            if let Some(prev) = parts.last_mut() {
                prev.push('|');
                prev.push_str(&text);
                continue;
            }
        }
        parts.push(text);
    }
    parts
}

fn classify_part(text: &str) -> PartKind {
    let trimmed = text.trim();
    if trimmed.parse::<f64>().is_ok() {
        return PartKind::Number;
    }
    if KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(trimmed)) {
        return PartKind::Keyword;
    }
    if FileRef::parse(trimmed).layer_name().is_some() {
        return PartKind::File;
    }
    let lower = trimmed.to_ascii_lowercase();
    if trimmed.contains('/') || trimmed.contains('\\') {
        return PartKind::File;
    }
    if let Some((_, ext)) = lower.rsplit_once('.') {
        if FILE_EXTENSIONS.contains(&ext) {
            return PartKind::File;
        }
    }
    PartKind::Text
}

fn classify_block(lhs: &str, rhs: &str) -> Option<BlockToken> {
    let key = normalize_key(lhs);
    let key = key.as_str();
    let names = rhs.to_string();
    let block = match key {
        "IF SCENARIO" => BlockToken::If {
            kind: ScopeKind::Scenario,
            names,
        },
        "IF EVENT" => BlockToken::If {
            kind: ScopeKind::Event,
            names,
        },
        "ELSE IF SCENARIO" | "ELSEIF SCENARIO" => BlockToken::ElseIf {
            kind: ScopeKind::Scenario,
            names,
        },
        "ELSE IF EVENT" | "ELSEIF EVENT" => BlockToken::ElseIf {
            kind: ScopeKind::Event,
            names,
        },
        "ELSE" if rhs.is_empty() => BlockToken::Else,
        "END IF" | "ENDIF" => BlockToken::EndIf,
        "END DEFINE" => BlockToken::EndDefine,
        "START 1D DOMAIN" => BlockToken::Start {
            kind: ScopeKind::OneDDomain,
            name: names,
        },
        "END 1D DOMAIN" => BlockToken::End {
            kind: ScopeKind::OneDDomain,
        },
        "START 2D DOMAIN" => BlockToken::Start {
            kind: ScopeKind::Control,
            name: names,
        },
        "END 2D DOMAIN" => BlockToken::End {
            kind: ScopeKind::Control,
        },
        _ => {
            let what = key.strip_prefix("DEFINE ")?;
            let kind = match what {
                "EVENT" => ScopeKind::EventDefine,
                "OUTPUT ZONE" | "MAP OUTPUT ZONE" => ScopeKind::OutputZone,
                _ => ScopeKind::Control,
            };
            BlockToken::Define { kind, name: names }
        }
    };
    Some(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_with_comment() {
        let cmd = Command::parse("  Cell Size == 5   ! metres");
        assert_eq!(cmd.lhs(), "Cell Size");
        assert_eq!(cmd.rhs(), "5");
        assert_eq!(cmd.comment(), Some("! metres"));
        assert_eq!(cmd.indent(), "  ");
        assert_eq!(cmd.key(), "CELL SIZE");
        assert!(cmd.is_setting());
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert!(Command::parse("   ").is_blank());
        assert!(Command::parse("! just a note").is_comment());
        assert!(Command::parse("# hash note").is_comment());
    }

    #[test]
    fn test_case_insensitive_blocks() {
        assert_eq!(
            Command::parse("if scenario == D01 | D02").block(),
            Some(&BlockToken::If {
                kind: ScopeKind::Scenario,
                names: "D01 | D02".into()
            })
        );
        assert_eq!(Command::parse("  End If").block(), Some(&BlockToken::EndIf));
        assert_eq!(Command::parse("Else").block(), Some(&BlockToken::Else));
        assert_eq!(
            Command::parse("Define Event == Q100").block(),
            Some(&BlockToken::Define {
                kind: ScopeKind::EventDefine,
                name: "Q100".into()
            })
        );
        assert_eq!(
            Command::parse("Start 1D Domain").block(),
            Some(&BlockToken::Start {
                kind: ScopeKind::OneDDomain,
                name: String::new()
            })
        );
    }

    #[test]
    fn test_rhs_parts() {
        let cmd = Command::parse(r"Read GIS Z Shape == gis\2d_zsh_L.shp | gis\2d_zsh_P.shp");
        let parts = cmd.rhs_parts();
        assert_eq!(parts.len(), 2);
        assert!(parts.iter().all(|p| p.kind == PartKind::File));

        let cmd = Command::parse("Read GIS Z Line == 2d_zln | 0.5 | ADD");
        let kinds: Vec<_> = cmd.rhs_parts().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PartKind::Text, PartKind::Number, PartKind::Keyword]);

        let cmd = Command::parse("Read GIS Z Shape == 2d_zsh_<<~s1~>>_R | db.gpkg >> 2d_zsh_P");
        let kinds: Vec<_> = cmd.rhs_parts().iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PartKind::Text, PartKind::File]);
    }

    #[test]
    fn test_ogr_layer_stays_together() {
        let cmd = Command::parse("Read GIS Code == model.gpkg|layername=2d_code_R");
        let parts = cmd.rhs_parts();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].text, "model.gpkg|layername=2d_code_R");
        assert_eq!(parts[0].kind, PartKind::File);
    }

    #[test]
    fn test_malformed_line_is_passthrough() {
        let cmd = Command::parse(r#"Read File == "broken.trd"#);
        assert_eq!(cmd.kind(), &LineKind::Unparsed);
        assert!(cmd.is_malformed());
        assert_eq!(cmd.raw(), r#"Read File == "broken.trd"#);
    }

    #[test]
    fn test_set_rhs_keeps_comment_and_indent() {
        let mut cmd = Command::parse("    Timestep == 2.5  ! seconds");
        cmd.set_rhs("1.0");
        assert_eq!(cmd.raw(), "    Timestep == 1.0  ! seconds");
    }

    #[test]
    fn test_set_lhs_keeps_value() {
        let mut cmd = Command::parse("Read GIS Z Line == 2d_zln_L.shp ! ridge");
        cmd.set_lhs("Read GIS Z Shape");
        assert_eq!(cmd.raw(), "Read GIS Z Shape == 2d_zln_L.shp ! ridge");
        assert_eq!(cmd.key(), "READ GIS Z SHAPE");
    }

    #[test]
    fn test_set_comment() {
        let mut cmd = Command::parse("Timestep == 2.5");
        cmd.set_comment(Some("halved"));
        assert_eq!(cmd.raw(), "Timestep == 2.5 ! halved");
        cmd.set_comment(None);
        assert_eq!(cmd.raw(), "Timestep == 2.5");
    }

    #[test]
    fn test_comment_toggle_round_trip() {
        let cmd = Command::parse("  Read GIS Z Shape == a.shp ! note");
        let commented = cmd.commented();
        assert!(commented.is_comment());
        assert_eq!(commented.raw(), "  ! Read GIS Z Shape == a.shp ! note");
        let back = commented.uncommented().unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn test_variable_and_event_source() {
        let cmd = Command::parse("Set Variable Cell_Size == 5");
        assert_eq!(cmd.variable_name().as_deref(), Some("Cell_Size"));
        assert!(cmd.is_variable_set());

        let cmd = Command::parse("BC Event Source == ~ARI~ | 100y");
        assert_eq!(
            cmd.event_source(),
            Some((SmolStr::new("~ARI~"), SmolStr::new("100y")))
        );
    }

    #[test]
    fn test_quoted_value() {
        let cmd = Command::parse(r#"Output Folder == "..\results\run 1\""#);
        assert_eq!(cmd.value(), r"..\results\run 1\");
    }
}
