//! Input queries.

use std::fmt;

use regex::Regex;

use crate::ids::ControlFileId;
use crate::input::{Input, InputKind};

#[derive(Debug, Clone)]
enum Matcher {
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Contains(needle) => text.to_lowercase().contains(needle),
            Matcher::Regex(re) => re.is_match(text),
        }
    }
}

type Predicate = Box<dyn Fn(&Input) -> bool>;

/// Criteria for [`Model::find_inputs`](crate::Model::find_inputs).
///
/// All given criteria must hold. Comments, blanks and block lines are
/// skipped unless [`InputQuery::any_line`] is set.
///
/// ```
/// use tuflow_model::{InputKind, InputQuery};
///
/// let query = InputQuery::new().lhs("read gis").kind(InputKind::Gis);
/// # let _ = query;
/// ```
#[derive(Default)]
pub struct InputQuery {
    lhs: Option<Matcher>,
    rhs: Option<Matcher>,
    kind: Option<InputKind>,
    control_file: Option<ControlFileId>,
    predicate: Option<Predicate>,
    any_line: bool,
}

impl InputQuery {
    /// A query that matches every command input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive substring of the command name.
    #[must_use]
    pub fn lhs(mut self, needle: &str) -> Self {
        self.lhs = Some(Matcher::Contains(needle.to_lowercase()));
        self
    }

    /// Case-insensitive substring of the value.
    #[must_use]
    pub fn rhs(mut self, needle: &str) -> Self {
        self.rhs = Some(Matcher::Contains(needle.to_lowercase()));
        self
    }

    /// Regex over the command name.
    ///
    /// # Errors
    /// Returns the regex error for invalid patterns.
    pub fn lhs_regex(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.lhs = Some(Matcher::Regex(Regex::new(pattern)?));
        Ok(self)
    }

    /// Regex over the value.
    ///
    /// # Errors
    /// Returns the regex error for invalid patterns.
    pub fn rhs_regex(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.rhs = Some(Matcher::Regex(Regex::new(pattern)?));
        Ok(self)
    }

    /// Only inputs of this kind.
    #[must_use]
    pub fn kind(mut self, kind: InputKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Only inputs of this control file.
    #[must_use]
    pub fn in_control_file(mut self, control_file: ControlFileId) -> Self {
        self.control_file = Some(control_file);
        self
    }

    /// Arbitrary predicate.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&Input) -> bool + 'static) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Also match comment, blank and block lines.
    #[must_use]
    pub fn any_line(mut self) -> Self {
        self.any_line = true;
        self
    }

    /// Returns `true` if `input` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, input: &Input) -> bool {
        if !self.any_line && !input.kind().is_command() && self.kind.is_none() {
            return false;
        }
        if self.kind.is_some_and(|k| k != input.kind()) {
            return false;
        }
        if self.control_file.is_some_and(|cf| cf != input.parent()) {
            return false;
        }
        if self.lhs.as_ref().is_some_and(|m| !m.is_match(input.lhs())) {
            return false;
        }
        if self.rhs.as_ref().is_some_and(|m| !m.is_match(input.rhs())) {
            return false;
        }
        self.predicate.as_ref().is_none_or(|p| p(input))
    }
}

impl fmt::Debug for InputQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputQuery")
            .field("lhs", &self.lhs)
            .field("rhs", &self.rhs)
            .field("kind", &self.kind)
            .field("control_file", &self.control_file)
            .field("predicate", &self.predicate.is_some())
            .field("any_line", &self.any_line)
            .finish()
    }
}
