//! Keyword dispatch from commands to input kinds.

use once_cell::sync::Lazy;
use regex::Regex;
use tuflow_syntax::{Command, LineKind};

use crate::input::InputKind;

/// Command patterns in priority order; the first match decides the kind.
const RULES: &[(&str, InputKind)] = &[
    (r"^SET VARIABLE\b", InputKind::Variable),
    (r"^BC EVENT (SOURCE|TEXT|NAME)$", InputKind::Event),
    (r"^READ FILE$", InputKind::ReadFile),
    (
        r"^(GEOMETRY|BC|ESTRY|QUADTREE|RAINFALL|OPERATIONS|ADVECTION|SWMM|OUTPUT|SOLUTION) CONTROL FILE$",
        InputKind::ControlFile,
    ),
    (r"^(EVENT FILE|EXTERNAL STRESS FILE)$", InputKind::ControlFile),
    (
        r"^(BC DATABASE|READ MATERIALS? FILE|READ SOILS? FILE|PIT INLET DATABASE|DEPTH DISCHARGE DATABASE|XS DATABASE|RAINFALL DATABASE|PIT DATABASE)$",
        InputKind::Database,
    ),
    (r"^READ GIS\b", InputKind::Gis),
    (r"^READ (GRID|TIN)\b", InputKind::Grid),
    (r"^SPATIAL DATABASE$", InputKind::File),
    (r"^READ\b", InputKind::File),
];

static TABLE: Lazy<Vec<(Regex, InputKind)>> = Lazy::new(|| {
    RULES
        .iter()
        .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, *kind)))
        .collect()
});

/// Chooses the input kind for a parsed line.
#[must_use]
pub fn classify(command: &Command) -> InputKind {
    match command.kind() {
        LineKind::Blank => InputKind::Blank,
        LineKind::Comment => InputKind::Comment,
        LineKind::Block(_) => InputKind::Block,
        LineKind::Unparsed => InputKind::Unparsed,
        LineKind::Setting => {
            let key = command.key();
            TABLE
                .iter()
                .find(|(re, _)| re.is_match(&key))
                .map_or(InputKind::Setting, |(_, kind)| *kind)
        }
    }
}

/// Commands whose layers store file names in their attributes.
pub(crate) fn has_attribute_files(key: &str) -> bool {
    matches!(
        key,
        "READ GIS TABLE LINKS" | "READ GIS XS" | "READ GIS BG" | "READ GIS NA"
    )
}
