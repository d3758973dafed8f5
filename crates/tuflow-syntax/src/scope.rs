//! Conditional-block scopes.
//!
//! Every control-file line lives inside zero or more conditional blocks
//! (`IF SCENARIO`, `IF EVENT`, `DEFINE EVENT`, ...). A [`Scope`] describes one
//! such block and a [`ScopeList`] the conjunction of all blocks around a line.

use std::fmt;

use smol_str::SmolStr;

use crate::expand::{self, PlaceholderKind, Variables};

/// Upper bound on candidate permutations tried by [`resolve_scope`].
pub const MAX_RESOLVE_PERMUTATIONS: usize = 4096;

/// The kind of block a scope comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKind {
    /// Outside every conditional block.
    Global,
    /// `IF SCENARIO == ...`
    Scenario,
    /// `IF EVENT == ...`
    Event,
    /// `DEFINE EVENT == ...` (event file definitions).
    EventDefine,
    /// Derived from a `<<NAME>>` user variable in a file name.
    Variable,
    /// `START 1D DOMAIN ... END 1D DOMAIN`
    OneDDomain,
    /// `DEFINE OUTPUT ZONE == ...`
    OutputZone,
    /// Any other `DEFINE` block and `START 2D DOMAIN` blocks.
    Control,
}

impl ScopeKind {
    /// Returns `true` if scopes of the two kinds can be compared.
    #[must_use]
    pub fn compatible(self, other: ScopeKind) -> bool {
        self == other
            || matches!(
                (self, other),
                (Self::Event, Self::EventDefine) | (Self::EventDefine, Self::Event)
            )
    }

    /// Display keyword as used in control files.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Global => "Global",
            Self::Scenario => "Scenario",
            Self::Event => "Event",
            Self::EventDefine => "Define Event",
            Self::Variable => "Variable",
            Self::OneDDomain => "1D Domain",
            Self::OutputZone => "Output Zone",
            Self::Control => "Define",
        }
    }
}

/// Membership in one conditional block.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Block kind.
    pub kind: ScopeKind,
    /// OR-joined names, in source order.
    pub names: Vec<SmolStr>,
    /// Placeholder token this scope was derived from, if any.
    pub variable: Option<SmolStr>,
    /// Active when none of `names` is selected.
    pub negated: bool,
    /// Produced by an `ELSE` or `ELSE IF` branch.
    pub is_else: bool,
    /// `false` while the names are still an unresolved placeholder.
    pub known: bool,
}

impl Scope {
    /// The global scope.
    #[must_use]
    pub fn global() -> Self {
        Self {
            kind: ScopeKind::Global,
            names: Vec::new(),
            variable: None,
            negated: false,
            is_else: false,
            known: true,
        }
    }

    /// A known scope with the given names.
    pub fn new<I, S>(kind: ScopeKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SmolStr>,
    {
        let mut unique: Vec<SmolStr> = Vec::new();
        for name in names.into_iter().map(Into::into) {
            if !unique.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                unique.push(name);
            }
        }
        Self {
            kind,
            names: unique,
            variable: None,
            negated: false,
            is_else: false,
            known: true,
        }
    }

    /// Parses an OR list such as `D01 | D02`.
    #[must_use]
    pub fn parse(kind: ScopeKind, text: &str) -> Self {
        Self::new(
            kind,
            text.split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(SmolStr::new),
        )
    }

    /// A scope whose names are still the placeholder `token`.
    #[must_use]
    pub fn unknown(kind: ScopeKind, token: &str) -> Self {
        Self {
            kind,
            names: Vec::new(),
            variable: Some(SmolStr::new(token)),
            negated: false,
            is_else: false,
            known: false,
        }
    }

    /// The scope implied by a placeholder token found in a file name.
    #[must_use]
    pub fn from_placeholder(token: &str) -> Self {
        let kind = match expand::placeholder_kind(token) {
            PlaceholderKind::Scenario(_) => ScopeKind::Scenario,
            PlaceholderKind::Event(_) => ScopeKind::Event,
            PlaceholderKind::Variable => ScopeKind::Variable,
        };
        Self::unknown(kind, token)
    }

    /// Marks the scope as resolved to `name`.
    pub fn resolve(&mut self, name: impl Into<SmolStr>) {
        self.names = vec![name.into()];
        self.known = true;
    }

    /// Returns `true` for the global scope.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.kind == ScopeKind::Global
    }

    /// Returns `true` if the two scopes overlap.
    ///
    /// Kinds must be compatible and negation must agree. Unknown scopes
    /// overlap when they come from the same placeholder token; known scopes
    /// overlap when they share at least one name.
    #[must_use]
    pub fn matches(&self, other: &Scope) -> bool {
        if !self.kind.compatible(other.kind) || self.negated != other.negated {
            return false;
        }
        if self.is_global() {
            return true;
        }
        if !self.known || !other.known {
            return match (&self.variable, &other.variable) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            };
        }
        self.names
            .iter()
            .any(|a| other.names.iter().any(|b| a.eq_ignore_ascii_case(b)))
    }

    /// Splits an OR list into one scope per name.
    #[must_use]
    pub fn explode(&self) -> Vec<Scope> {
        if self.names.len() <= 1 {
            return vec![self.clone()];
        }
        self.names
            .iter()
            .map(|name| Scope {
                names: vec![name.clone()],
                ..self.clone()
            })
            .collect()
    }

    /// A copy with negation inverted.
    #[must_use]
    pub fn as_negated(&self) -> Scope {
        Scope {
            negated: !self.negated,
            ..self.clone()
        }
    }

    /// A copy with negation cleared.
    #[must_use]
    pub fn as_positive(&self) -> Scope {
        Scope {
            negated: false,
            ..self.clone()
        }
    }

    /// Returns `true` if this scope can be evaluated against a selection.
    #[must_use]
    pub fn is_resolvable(&self) -> bool {
        self.is_global()
            || (self.known
                && matches!(
                    self.kind,
                    ScopeKind::Scenario | ScopeKind::Event | ScopeKind::EventDefine
                ))
    }

    /// Evaluates the scope against concrete scenario/event names.
    #[must_use]
    pub fn is_active(&self, selection: &Selection<'_>) -> bool {
        if !self.known {
            return true;
        }
        let selected = match self.kind {
            ScopeKind::Scenario => selection.scenarios,
            ScopeKind::Event | ScopeKind::EventDefine => selection.events,
            _ => return true,
        };
        let hit = self
            .names
            .iter()
            .any(|n| selected.iter().any(|s| s.eq_ignore_ascii_case(n)));
        hit != self.negated
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        if !self.kind.compatible(other.kind) || self.negated != other.negated {
            return false;
        }
        if !self.known || !other.known {
            return match (&self.variable, &other.variable) {
                (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                _ => false,
            };
        }
        self.names.len() == other.names.len()
            && self
                .names
                .iter()
                .all(|a| other.names.iter().any(|b| a.eq_ignore_ascii_case(b)))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            return f.write_str("Global");
        }
        if self.negated {
            f.write_str("!")?;
        }
        f.write_str(self.kind.keyword())?;
        f.write_str(" == ")?;
        if self.known {
            let names: Vec<&str> = self.names.iter().map(SmolStr::as_str).collect();
            f.write_str(&names.join(" | "))
        } else {
            f.write_str(self.variable.as_deref().unwrap_or("?"))
        }
    }
}

/// Concrete scenario and event names a scope is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    /// Selected scenario names (`-s1`, `-s2`, ...).
    pub scenarios: &'a [SmolStr],
    /// Selected event names (`-e1`, `-e2`, ...).
    pub events: &'a [SmolStr],
}

/// The conjunction of scopes a line is subject to.
///
/// An empty list behaves as the global scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeList(Vec<Scope>);

impl ScopeList {
    /// Creates a list from scopes.
    #[must_use]
    pub fn new(scopes: Vec<Scope>) -> Self {
        let mut list = Self(scopes);
        list.normalize();
        list
    }

    /// The global list.
    #[must_use]
    pub fn global() -> Self {
        Self(vec![Scope::global()])
    }

    fn normalize(&mut self) {
        if self.0.len() > 1 {
            self.0.retain(|s| !s.is_global());
        }
        if self.0.is_empty() {
            self.0.push(Scope::global());
        }
    }

    /// Appends a scope.
    pub fn push(&mut self, scope: Scope) {
        self.0.push(scope);
        self.normalize();
    }

    /// Appends every scope of `other`.
    pub fn extend(&mut self, other: &ScopeList) {
        self.0.extend(other.0.iter().cloned());
        self.normalize();
    }

    /// A new list holding both sets of scopes.
    #[must_use]
    pub fn combined(&self, other: &ScopeList) -> ScopeList {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    /// Iterates over the scopes.
    pub fn iter(&self) -> std::slice::Iter<'_, Scope> {
        self.0.iter()
    }

    /// Mutable access for resolving placeholder scopes in place.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Scope> {
        self.0.iter_mut()
    }

    /// Number of scopes in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the list holds no scopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if every scope is global.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.iter().all(Scope::is_global)
    }

    /// Returns `true` if some scope is still an unresolved placeholder.
    #[must_use]
    pub fn has_unknown(&self) -> bool {
        self.0.iter().any(|s| !s.known)
    }

    /// Membership test that explodes OR lists on both sides.
    ///
    /// Every single-name unit of `scope` must match some unit of the list.
    #[must_use]
    pub fn contains(&self, scope: &Scope) -> bool {
        let units: Vec<Scope> = self.0.iter().flat_map(Scope::explode).collect();
        scope
            .explode()
            .iter()
            .all(|needle| units.iter().any(|u| u.matches(needle)))
    }

    /// Returns `true` if every scope is active under the selection.
    #[must_use]
    pub fn is_active(&self, selection: &Selection<'_>) -> bool {
        self.0.iter().all(|s| s.is_active(selection))
    }

    /// The scopes a selection cannot decide.
    #[must_use]
    pub fn unresolved(&self) -> ScopeList {
        ScopeList::new(
            self.0
                .iter()
                .filter(|s| !s.is_resolvable())
                .cloned()
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a ScopeList {
    type Item = &'a Scope;
    type IntoIter = std::slice::Iter<'a, Scope>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Scope> for ScopeList {
    fn from_iter<T: IntoIterator<Item = Scope>>(iter: T) -> Self {
        ScopeList::new(iter.into_iter().collect())
    }
}

impl fmt::Display for ScopeList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, scope) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" & ")?;
            }
            write!(f, "{scope}")?;
        }
        Ok(())
    }
}

/// Best-effort naming of unknown scopes from a resolved path.
///
/// Substitutes every arrangement of `candidates` into the placeholders of
/// `template` and accepts the first one whose result equals `resolved`
/// (case-insensitive, separator-insensitive). Matching scopes in `unknown`
/// take the substituted names. Returns `false` and leaves the scopes
/// untouched when nothing fits; ambiguous templates can legitimately stay
/// unknown.
pub fn resolve_scope(
    unknown: &mut [Scope],
    template: &str,
    resolved: &str,
    candidates: &[SmolStr],
) -> bool {
    let mut tokens: Vec<&str> = Vec::new();
    for token in expand::placeholders(template) {
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            tokens.push(token);
        }
    }
    if tokens.is_empty() || tokens.len() > candidates.len() {
        return false;
    }
    let total = u32::try_from(tokens.len())
        .ok()
        .and_then(|k| candidates.len().checked_pow(k));
    if total.is_none_or(|n| n > MAX_RESOLVE_PERMUTATIONS) {
        return false;
    }

    let mut choice = vec![0usize; tokens.len()];
    loop {
        if is_permutation(&choice) {
            let mut variables = Variables::new();
            for (token, idx) in tokens.iter().zip(&choice) {
                expand::insert_variable(&mut variables, token, candidates[*idx].clone());
            }
            if expand::paths_match(&expand::expand(template, &variables), resolved) {
                for scope in unknown.iter_mut() {
                    let Some(var) = scope.variable.clone() else {
                        continue;
                    };
                    if let Some(pos) = tokens.iter().position(|t| t.eq_ignore_ascii_case(&var)) {
                        scope.resolve(candidates[choice[pos]].clone());
                    }
                }
                return true;
            }
        }
        if !advance(&mut choice, candidates.len()) {
            return false;
        }
    }
}

/// No candidate is used for two placeholders.
fn is_permutation(choice: &[usize]) -> bool {
    choice
        .iter()
        .enumerate()
        .all(|(i, idx)| !choice[..i].contains(idx))
}

fn advance(choice: &mut [usize], base: usize) -> bool {
    for slot in choice.iter_mut().rev() {
        *slot += 1;
        if *slot < base {
            return true;
        }
        *slot = 0;
    }
    false
}
