//! Shared helpers for parser snapshot tests.
#![allow(dead_code, unused_imports)]

use std::fmt::Write;

pub use tuflow_syntax::{parse, Command, LineKind, Parsed, Scope, ScopeKind, ScopeList};

/// Formats every parsed line as `line kind [scope] text`.
pub fn snapshot_parse(source: &str) -> String {
    let parsed = parse(source);
    let mut out = String::new();
    for line in &parsed.lines {
        let command = &line.command;
        let kind = match command.kind() {
            LineKind::Blank => "blank",
            LineKind::Comment => "comment",
            LineKind::Setting => "setting",
            LineKind::Block(_) => "block",
            LineKind::Unparsed => "unparsed",
        };
        let _ = write!(out, "{} {kind} [{}] ", line.line, line.scope);
        if command.is_setting() {
            let _ = writeln!(out, "{:?} = {:?}", command.lhs(), command.rhs());
        } else {
            let _ = writeln!(out, "{:?}", command.raw().trim());
        }
    }
    for issue in &parsed.issues {
        let _ = writeln!(out, "issue: {issue}");
    }
    out
}

/// Raw text of every line, joined back together.
pub fn reassemble(parsed: &Parsed) -> String {
    parsed
        .lines
        .iter()
        .map(|l| format!("{}\n", l.command.raw()))
        .collect()
}
