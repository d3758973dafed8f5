//! Variable and wildcard expansion.
//!
//! Control-file values may contain `<<NAME>>` placeholders that refer to
//! user variables (`Set Variable NAME == value`) or to the positional
//! scenario/event slots (`<<~s1~>>`, `<<~e~>>`). Expansion never fails:
//! placeholders without a value stay in the text until a run context can
//! supply one.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use smol_str::SmolStr;

/// Variable values keyed by upper-case placeholder name (without `<<`/`>>`).
pub type Variables = IndexMap<SmolStr, SmolStr>;

/// Wildcard patterns used when no settings override them.
pub const DEFAULT_WILDCARDS: &[&str] = &[r"<<~[sSeE]\d?~>>", r"<<[^<>]+>>", r"~[A-Za-z0-9_]+~"];

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<<[^<>\r\n]*>>").expect("placeholder pattern is valid"));

/// What a placeholder stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderKind {
    /// `<<~s~>>` or `<<~sN~>>`; the slot is 1-based.
    Scenario(u8),
    /// `<<~e~>>` or `<<~eN~>>`; the slot is 1-based.
    Event(u8),
    /// Any other `<<NAME>>`.
    Variable,
}

/// Normalized lookup key of a placeholder token: `<<~s1~>>` -> `~S1~`.
#[must_use]
pub fn placeholder_key(token: &str) -> SmolStr {
    let inner = token
        .trim()
        .trim_start_matches("<<")
        .trim_end_matches(">>")
        .trim();
    SmolStr::new(inner.to_ascii_uppercase())
}

/// Classifies a placeholder token or key.
#[must_use]
pub fn placeholder_kind(token: &str) -> PlaceholderKind {
    let key = placeholder_key(token);
    let bytes = key.as_bytes();
    if bytes.len() >= 3 && bytes[0] == b'~' && bytes[bytes.len() - 1] == b'~' {
        let slot = &key[2..key.len() - 1];
        let index = if slot.is_empty() {
            Some(1)
        } else {
            slot.parse::<u8>().ok().filter(|n| *n > 0)
        };
        if let Some(index) = index {
            match bytes[1] {
                b'S' => return PlaceholderKind::Scenario(index),
                b'E' => return PlaceholderKind::Event(index),
                _ => {}
            }
        }
    }
    PlaceholderKind::Variable
}

/// Inserts a variable, normalizing its name to a lookup key.
pub fn insert_variable(variables: &mut Variables, name: &str, value: impl Into<SmolStr>) {
    variables.insert(placeholder_key(name), value.into());
}

/// Returns every `<<...>>` token in `text`, in order of appearance.
#[must_use]
pub fn placeholders(text: &str) -> Vec<&str> {
    PLACEHOLDER.find_iter(text).map(|m| m.as_str()).collect()
}

/// Returns `true` if `text` contains at least one `<<...>>` token.
#[must_use]
pub fn has_placeholders(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

/// Replaces each known `<<NAME>>` with its value; unknown tokens are kept.
#[must_use]
pub fn expand(text: &str, variables: &Variables) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            match variables.get(&placeholder_key(token)) {
                Some(value) => value.to_string(),
                None => token.to_string(),
            }
        })
        .into_owned()
}

/// Replaces `~NAME~` event-source tokens (case-insensitive).
///
/// Keys of `sources` are upper-case tokens including the tildes.
#[must_use]
pub fn expand_event_tokens(text: &str, sources: &Variables) -> String {
    let mut out = text.to_string();
    for (token, value) in sources {
        let Ok(re) = Regex::new(&format!("(?i){}", regex::escape(token))) else {
            continue;
        };
        out = re.replace_all(&out, regex::NoExpand(value)).into_owned();
    }
    out
}

/// Compiled wildcard patterns for turning templates into glob patterns.
#[derive(Debug, Clone)]
pub struct Wildcards {
    patterns: Vec<Regex>,
}

impl Default for Wildcards {
    fn default() -> Self {
        Self::new(DEFAULT_WILDCARDS).unwrap_or(Self {
            patterns: Vec::new(),
        })
    }
}

impl Wildcards {
    /// Compiles the given patterns.
    ///
    /// # Errors
    /// Returns the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Replaces every wildcard match with `*`.
    #[must_use]
    pub fn globify(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, "*").into_owned();
        }
        collapse_stars(&out)
    }

    /// Returns `true` if any pattern matches `text`.
    #[must_use]
    pub fn is_wild(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

/// Replaces wildcard regex matches in `text` with `*`.
///
/// Invalid patterns are ignored.
#[must_use]
pub fn globify<S: AsRef<str>>(text: &str, patterns: &[S]) -> String {
    let compiled = Wildcards {
        patterns: patterns
            .iter()
            .filter_map(|p| Regex::new(p.as_ref()).ok())
            .collect(),
    };
    compiled.globify(text)
}

/// Collapses runs of `*` into one, unless the run is a whole path component.
fn collapse_stars(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '*' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i] == '*' {
            i += 1;
        }
        let run = i - start;
        let before_sep = start == 0 || is_separator(chars[start - 1]);
        let after_sep = i == chars.len() || is_separator(chars[i]);
        if run >= 2 && before_sep && after_sep {
            out.push_str("**");
        } else {
            out.push('*');
        }
    }
    out
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Normalizes a path-like string for comparison.
#[must_use]
pub fn normalize_separators(text: &str) -> String {
    text.trim().replace('\\', "/")
}

/// Case-insensitive path equality that ignores separator style.
#[must_use]
pub fn paths_match(a: &str, b: &str) -> bool {
    normalize_separators(a).eq_ignore_ascii_case(&normalize_separators(b))
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in PLACEHOLDER.find_iter(template) {
        if m.start() > last {
            out.push(Segment::Literal(&template[last..m.start()]));
        }
        out.push(Segment::Placeholder(m.as_str()));
        last = m.end();
    }
    if last < template.len() {
        out.push(Segment::Literal(&template[last..]));
    }
    out
}

/// Recovers the value each placeholder of `template` took in `resolved`.
///
/// Keys are the placeholder tokens as written in the template. A
/// placeholder directly next to another placeholder cannot be isolated and
/// maps to an empty string, as do all placeholders when `resolved` does not
/// fit the template at all.
#[must_use]
pub fn extract_names_from_pattern(template: &str, resolved: &str) -> IndexMap<String, String> {
    let template = normalize_separators(template);
    let resolved = normalize_separators(resolved);
    let segs = segments(&template);

    let mut out: IndexMap<String, String> = IndexMap::new();
    for seg in &segs {
        if let Segment::Placeholder(token) = seg {
            out.entry((*token).to_string()).or_default();
        }
    }
    if out.is_empty() {
        return out;
    }

    let mut pattern = String::from("(?i)^");
    for seg in &segs {
        match seg {
            Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
            Segment::Placeholder(_) => pattern.push_str("(.+?)"),
        }
    }
    pattern.push('$');
    let Ok(re) = Regex::new(&pattern) else {
        return out;
    };
    let Some(caps) = re.captures(&resolved) else {
        return out;
    };

    let mut group = 0;
    let mut assigned: Vec<String> = Vec::new();
    for (i, seg) in segs.iter().enumerate() {
        let Segment::Placeholder(token) = seg else {
            continue;
        };
        group += 1;
        let adjacent = matches!(segs.get(i + 1), Some(Segment::Placeholder(_)))
            || (i > 0 && matches!(segs.get(i - 1), Some(Segment::Placeholder(_))));
        if assigned.iter().any(|t| t == token) {
            continue;
        }
        assigned.push((*token).to_string());
        if adjacent {
            continue;
        }
        if let Some(m) = caps.get(group) {
            out.insert((*token).to_string(), m.as_str().to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        let mut out = Variables::new();
        for (k, v) in pairs {
            insert_variable(&mut out, k, *v);
        }
        out
    }

    #[test]
    fn test_expand_known_and_unknown() {
        let variables = vars(&[("CELL_SIZE", "5m"), ("~s1~", "EXG")]);
        assert_eq!(
            expand("grid_<<cell_size>>_<<~s1~>>_<<missing>>.tif", &variables),
            "grid_5m_EXG_<<missing>>.tif"
        );
    }

    #[test]
    fn test_placeholder_kinds() {
        assert_eq!(placeholder_kind("<<~s1~>>"), PlaceholderKind::Scenario(1));
        assert_eq!(placeholder_kind("<<~S~>>"), PlaceholderKind::Scenario(1));
        assert_eq!(placeholder_kind("<<~e2~>>"), PlaceholderKind::Event(2));
        assert_eq!(placeholder_kind("<<CELL>>"), PlaceholderKind::Variable);
        assert_eq!(placeholder_kind("<<~x~>>"), PlaceholderKind::Variable);
    }

    #[test]
    fn test_globify_scenario_slot() {
        assert_eq!(globify("file_<<~s1~>>.shp", &[r"<<~s\d?~>>"]), "file_*.shp");
    }

    #[test]
    fn test_globify_collapses_adjacent_wildcards() {
        let wildcards = Wildcards::default();
        assert_eq!(wildcards.globify("zsh_<<~s1~>><<~s2~>>.shp"), "zsh_*.shp");
        assert_eq!(wildcards.globify("<<dir>>/<<~s~>>/x.csv"), "*/*/x.csv");
    }

    #[test]
    fn test_globify_keeps_recursive_component() {
        assert_eq!(globify("model/**/x.tgc", &[r"<<[^<>]+>>"]), "model/**/x.tgc");
        assert_eq!(globify("model/a**b.tgc", &[r"<<[^<>]+>>"]), "model/a*b.tgc");
    }

    #[test]
    fn test_event_tokens() {
        let mut sources = Variables::new();
        sources.insert("~ARI~".into(), "100y".into());
        assert_eq!(
            expand_event_tokens("flow_~ari~_2h.csv", &sources),
            "flow_100y_2h.csv"
        );
    }

    #[test]
    fn test_extract_names() {
        let names = extract_names_from_pattern(
            r"..\model\M01_<<~s1~>>_<<~e1~>>.tgc",
            "../model/m01_EXG_Q100.tgc",
        );
        assert_eq!(names.get("<<~s1~>>").map(String::as_str), Some("EXG"));
        assert_eq!(names.get("<<~e1~>>").map(String::as_str), Some("Q100"));
    }

    #[test]
    fn test_extract_adjacent_placeholders_are_unknown() {
        let names = extract_names_from_pattern("zsh_<<~s1~>><<~s2~>>.shp", "zsh_D01D02.shp");
        assert_eq!(names.get("<<~s1~>>").map(String::as_str), Some(""));
        assert_eq!(names.get("<<~s2~>>").map(String::as_str), Some(""));
    }

    #[test]
    fn test_extract_no_match() {
        let names = extract_names_from_pattern("zsh_<<~s1~>>.shp", "other.shp");
        assert_eq!(names.len(), 1);
        assert_eq!(names["<<~s1~>>"], "");
    }

    #[test]
    fn test_paths_match() {
        assert!(paths_match(r"..\Model\A.tgc", "../model/a.TGC"));
        assert!(!paths_match("a.tgc", "b.tgc"));
    }
}
