//! Run-state projection.
//!
//! A [`RunState`] is the view of the model for one scenario/event
//! selection: only active inputs, placeholders substituted, and exactly one
//! child chosen for every control-file reference. It borrows the model and
//! is rebuilt after edits.

use std::path::Path;

use smol_str::SmolStr;
use tuflow_syntax::expand::insert_variable;
use tuflow_syntax::{
    expand, expand_event_tokens, has_placeholders, normalize_key, paths_match, value_parts,
    FileRef, PartKind, ScopeList, Selection, Variables,
};

use crate::database::Entry;
use crate::error::{ModelError, Result};
use crate::ids::{ChildRef, ControlFileId, DatabaseId, InputId};
use crate::input::{Input, InputKind};
use crate::loader::reference_text;
use crate::model::Model;
use crate::query::InputQuery;

/// Selected scenarios and events, in slot order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    scenarios: Vec<SmolStr>,
    events: Vec<SmolStr>,
}

impl RunContext {
    /// An empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the next scenario slot (`-s1`, `-s2`, ...).
    #[must_use]
    pub fn scenario(mut self, name: impl Into<SmolStr>) -> Self {
        self.scenarios.push(name.into());
        self
    }

    /// Adds the next event slot (`-e1`, `-e2`, ...).
    #[must_use]
    pub fn event(mut self, name: impl Into<SmolStr>) -> Self {
        self.events.push(name.into());
        self
    }

    /// Selected scenarios.
    #[must_use]
    pub fn scenarios(&self) -> &[SmolStr] {
        &self.scenarios
    }

    /// Selected events.
    #[must_use]
    pub fn events(&self) -> &[SmolStr] {
        &self.events
    }

    /// The selection scopes are evaluated against.
    #[must_use]
    pub fn selection(&self) -> Selection<'_> {
        Selection {
            scenarios: &self.scenarios,
            events: &self.events,
        }
    }

    /// The `~s~`/`~sN~`/`~e~`/`~eN~` slot variables.
    #[must_use]
    pub fn slot_variables(&self) -> Variables {
        let mut out = Variables::new();
        for (prefix, names) in [("S", &self.scenarios), ("E", &self.events)] {
            for (i, name) in names.iter().enumerate() {
                if i == 0 {
                    insert_variable(&mut out, &format!("~{prefix}~"), name.clone());
                }
                insert_variable(&mut out, &format!("~{prefix}{}~", i + 1), name.clone());
            }
        }
        out
    }
}

/// An active input with its values substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    /// The build-state input.
    pub id: InputId,
    /// Control file holding it.
    pub control_file: ControlFileId,
    /// Input kind.
    pub kind: InputKind,
    /// Command name as written.
    pub lhs: String,
    /// Upper-case lookup key.
    pub key: SmolStr,
    /// Value after substitution.
    pub value: String,
    /// Files the value refers to after substitution.
    pub files: Vec<FileRef>,
    /// Scopes the run selection could not decide (variable, domain scopes).
    pub unresolved_scope: ScopeList,
}

/// A database entry resolved for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry<'m> {
    /// The build-state entry.
    pub entry: &'m Entry,
    /// Files after event substitution.
    pub files: Vec<FileRef>,
}

/// The model seen through one [`RunContext`].
#[derive(Debug)]
pub struct RunState<'m> {
    model: &'m Model,
    context: RunContext,
    variables: Variables,
    event_sources: Variables,
    control_files: Vec<ControlFileId>,
    inputs: Vec<ResolvedInput>,
}

impl Model {
    /// Projects the model onto a scenario/event selection.
    ///
    /// # Errors
    /// Returns [`ModelError::UnresolvedVariable`] when a file reference of an
    /// active input still holds a placeholder after substitution.
    pub fn context(&self, context: RunContext) -> Result<RunState<'_>> {
        RunState::new(self, context)
    }
}

/// Collected while walking the active tree.
struct Walk {
    variables: Variables,
    event_sources: Variables,
    event_text: Option<SmolStr>,
    event_name: Option<SmolStr>,
    control_files: Vec<ControlFileId>,
    active: Vec<InputId>,
}

impl<'m> RunState<'m> {
    fn new(model: &'m Model, context: RunContext) -> Result<Self> {
        let mut walk = Walk {
            variables: context.slot_variables(),
            event_sources: Variables::new(),
            event_text: None,
            event_name: None,
            control_files: Vec::new(),
            active: Vec::new(),
        };
        for event in context.events() {
            if let Some(sources) = model.config.event_database.sources(event) {
                for (token, value) in sources {
                    walk.event_sources.insert(token.clone(), value.clone());
                }
            }
        }
        walk_control_file(model, ControlFileId::ROOT, &context, &mut walk)?;
        if let (Some(text), Some(name)) = (walk.event_text.take(), walk.event_name.take()) {
            walk.event_sources
                .insert(SmolStr::new(text.to_ascii_uppercase()), name);
        }

        let mut inputs = Vec::with_capacity(walk.active.len());
        for id in &walk.active {
            let input = model.input(*id)?;
            inputs.push(resolve(model, input, &walk.variables, &walk.event_sources)?);
        }
        Ok(Self {
            model,
            context,
            variables: walk.variables,
            event_sources: walk.event_sources,
            control_files: walk.control_files,
            inputs,
        })
    }

    /// The selection this state was built for.
    #[must_use]
    pub fn run_context(&self) -> &RunContext {
        &self.context
    }

    /// Variables in effect, including scenario and event slots.
    #[must_use]
    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Event source tokens in effect, keyed by upper-case token.
    #[must_use]
    pub fn event_sources(&self) -> &Variables {
        &self.event_sources
    }

    /// Active inputs in model order. `Read File` markers are left out; the
    /// fragment lines appear in their place.
    #[must_use]
    pub fn inputs(&self) -> &[ResolvedInput] {
        &self.inputs
    }

    /// Active inputs matching `query`.
    #[must_use]
    pub fn find_inputs(&self, query: &InputQuery) -> Vec<&ResolvedInput> {
        self.inputs
            .iter()
            .filter(|resolved| {
                self.model
                    .input(resolved.id)
                    .is_ok_and(|input| query.matches(input))
            })
            .collect()
    }

    /// Value of a command; the last active definition wins.
    #[must_use]
    pub fn value(&self, lhs: &str) -> Option<&str> {
        let key = normalize_key(lhs);
        self.inputs
            .iter()
            .rev()
            .find(|input| input.key == key)
            .map(|input| input.value.as_str())
    }

    /// Active control files, parents before children.
    #[must_use]
    pub fn control_files(&self) -> &[ControlFileId] {
        &self.control_files
    }

    /// Databases referenced by active inputs.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseId> {
        let mut out = Vec::new();
        for resolved in &self.inputs {
            let Ok(input) = self.model.input(resolved.id) else {
                continue;
            };
            for child in &input.children {
                if let ChildRef::Database(db) = child {
                    if !out.contains(db) {
                        out.push(*db);
                    }
                }
            }
        }
        out
    }

    /// Entries of a database with event tokens substituted.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownDatabase`] for foreign ids.
    pub fn database_entries(&self, database: DatabaseId) -> Result<Vec<ResolvedEntry<'m>>> {
        let db = self.model.database(database)?;
        let dir = db.dir();
        Ok(db
            .entries()
            .map(|entry| ResolvedEntry {
                entry,
                files: entry
                    .file_templates()
                    .into_iter()
                    .map(|template| {
                        let text = expand_event_tokens(template, &self.event_sources);
                        FileRef::parse(&text).resolved_against(dir)
                    })
                    .collect(),
            })
            .collect())
    }
}

fn walk_control_file(
    model: &Model,
    cf: ControlFileId,
    context: &RunContext,
    walk: &mut Walk,
) -> Result<()> {
    if walk.control_files.contains(&cf) {
        return Ok(());
    }
    walk.control_files.push(cf);
    let selection = context.selection();
    for input in model.inputs(cf)? {
        if !input.kind.is_command() || !input.scope.is_active(&selection) {
            continue;
        }
        match input.kind {
            InputKind::Variable => {
                if let Some(name) = input.command.variable_name() {
                    let value = expand(&input.value(), &walk.variables);
                    insert_variable(&mut walk.variables, &name, value);
                }
            }
            InputKind::Event => match input.key().as_str() {
                "BC EVENT SOURCE" => {
                    if let Some((token, value)) = input.command.event_source() {
                        walk.event_sources.insert(token, value);
                    }
                }
                "BC EVENT TEXT" => walk.event_text = Some(SmolStr::new(input.value().trim())),
                "BC EVENT NAME" => walk.event_name = Some(SmolStr::new(input.value().trim())),
                _ => {}
            },
            _ => {}
        }
        if input.kind != InputKind::ReadFile {
            walk.active.push(input.id);
        }
        if input.kind == InputKind::ControlFile {
            if let Some(child) = active_child(model, input, context, walk)? {
                walk_control_file(model, child, context, walk)?;
            }
        }
    }
    Ok(())
}

/// The child a control-file reference loads under the selection.
///
/// A wildcard reference only loads the child whose path equals the expanded
/// value; without one the reference stays unloaded for this selection.
fn active_child(
    model: &Model,
    input: &Input,
    context: &RunContext,
    walk: &Walk,
) -> Result<Option<ControlFileId>> {
    let children: Vec<ControlFileId> = input
        .children
        .iter()
        .filter_map(|child| match child {
            ChildRef::ControlFile(cf) => Some(*cf),
            ChildRef::Database(_) => None,
        })
        .collect();
    let wild = model.wildcards.is_wild(input.command.rhs());
    if !wild && children.len() <= 1 {
        return Ok(children.first().copied());
    }
    let value = expand_event_tokens(
        &expand(&input.value(), &walk.variables),
        &walk.event_sources,
    );
    if has_placeholders(&value) {
        return Err(ModelError::UnresolvedVariable {
            input: input.id,
            text: value,
        });
    }
    let dir = model.control_file(input.parent)?.dir();
    let first = value_parts(&value)
        .into_iter()
        .next()
        .map(|part| part.text)
        .unwrap_or_default();
    let expected = FileRef::parse(&first).resolved_against(dir);
    let expected = expected.path().to_string_lossy();
    let by_path = children.iter().copied().find(|cf| {
        model
            .control_file(*cf)
            .is_ok_and(|file| paths_match(&file.path().to_string_lossy(), &expected))
    });
    if by_path.is_some() || wild {
        return Ok(by_path);
    }
    let selection = context.selection();
    Ok(children.into_iter().find(|cf| {
        model
            .control_file(*cf)
            .is_ok_and(|file| file.scope.is_active(&selection))
    }))
}

fn resolve(
    model: &Model,
    input: &Input,
    variables: &Variables,
    event_sources: &Variables,
) -> Result<ResolvedInput> {
    let value = expand_event_tokens(&expand(&input.value(), variables), event_sources);
    let mut files = Vec::new();
    if input.kind.references_files() {
        if has_placeholders(&value) {
            return Err(ModelError::UnresolvedVariable {
                input: input.id,
                text: value,
            });
        }
        let dir = model.control_file(input.parent)?.dir();
        files = run_files(model, input, &value, dir);
    }
    Ok(ResolvedInput {
        id: input.id,
        control_file: input.parent,
        kind: input.kind,
        lhs: input.lhs().to_string(),
        key: input.key(),
        value,
        files,
        unresolved_scope: input.scope.unresolved(),
    })
}

fn run_files(model: &Model, input: &Input, value: &str, dir: &Path) -> Vec<FileRef> {
    let parts = value_parts(value);
    let candidates: Vec<_> = match input.kind {
        InputKind::Gis | InputKind::Grid => parts.into_iter().filter(|p| p.could_be_file()).collect(),
        _ => parts
            .into_iter()
            .take(1)
            .filter(|p| p.kind != PartKind::Number && p.kind != PartKind::Keyword)
            .collect(),
    };
    // `ESTRY Control File == AUTO` names no file of its own.
    if input.kind == InputKind::ControlFile && !input.files.is_empty() && candidates.is_empty() {
        return input.files.clone();
    }
    candidates
        .into_iter()
        .map(|part| {
            let text = reference_text(input.kind, &part.text, part.kind, &model.config);
            FileRef::parse(&text).resolved_against(dir)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{FileGis, MemoryFileSystem};

    const IF_ELSE: &str = "If Scenario == D01\n\
                           Read GIS Z Shape == 2d_zsh_D01.shp\n\
                           Else\n\
                           Read GIS Z Shape == 2d_zsh_EXG.shp\n\
                           End If\n";

    fn gis_files(state: &RunState<'_>) -> Vec<String> {
        state
            .inputs()
            .iter()
            .filter(|i| i.kind == InputKind::Gis)
            .flat_map(|i| i.files.iter().map(ToString::to_string))
            .collect()
    }

    #[test]
    fn test_scenario_selects_branch() {
        let fs = MemoryFileSystem::new().with_file("/m/model.tcf", IF_ELSE);
        let model = Model::load("/m/model.tcf", fs, FileGis).unwrap();
        let d01 = model.context(RunContext::new().scenario("D01")).unwrap();
        assert_eq!(gis_files(&d01), ["/m/2d_zsh_D01.shp"]);
        let d02 = model.context(RunContext::new().scenario("D02")).unwrap();
        assert_eq!(gis_files(&d02), ["/m/2d_zsh_EXG.shp"]);
    }

    #[test]
    fn test_slot_and_user_variables() {
        let fs = MemoryFileSystem::new().with_file(
            "/m/model.tcf",
            "Set Variable CELL == 5\n\
             If Scenario == fine\n\
             Set Variable CELL == 2\n\
             End If\n\
             Cell Size == <<CELL>>\n\
             Read GRID Zpts == grid\\dem_<<~s1~>>_<<~e1~>>.tif\n",
        );
        let model = Model::load("/m/model.tcf", fs, FileGis).unwrap();
        let state = model
            .context(RunContext::new().scenario("fine").event("Q100"))
            .unwrap();
        assert_eq!(state.value("cell size"), Some("2"));
        let grid = state
            .inputs()
            .iter()
            .find(|i| i.kind == InputKind::Grid)
            .unwrap();
        assert_eq!(grid.files[0].to_string(), "/m/grid/dem_fine_Q100.tif");
        let coarse = model.context(RunContext::new().event("Q100"));
        assert!(matches!(
            coarse,
            Err(ModelError::UnresolvedVariable { .. })
        ));
    }

    #[test]
    fn test_duplicate_children_resolve_by_path() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "Geometry Control File == geom_<<~s1~>>.tgc\n")
            .with_file("/m/geom_A.tgc", "Cell Size == 1\n")
            .with_file("/m/geom_B.tgc", "Cell Size == 2\n");
        let model = Model::load("/m/model.tcf", fs, FileGis).unwrap();
        let state = model.context(RunContext::new().scenario("B")).unwrap();
        assert_eq!(state.control_files().len(), 2);
        assert_eq!(state.value("Cell Size"), Some("2"));
    }

    #[test]
    fn test_single_wildcard_child_must_match_selection() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "Geometry Control File == geom_<<~s1~>>.tgc\n")
            .with_file("/m/geom_A.tgc", "Cell Size == 1\n");
        let model = Model::load("/m/model.tcf", fs, FileGis).unwrap();

        let a = model.context(RunContext::new().scenario("A")).unwrap();
        assert_eq!(a.control_files().len(), 2);
        assert_eq!(a.value("Cell Size"), Some("1"));

        let b = model.context(RunContext::new().scenario("B")).unwrap();
        assert_eq!(b.control_files(), &[ControlFileId::ROOT]);
        assert_eq!(b.value("Cell Size"), None);
        let reference = &b.inputs()[0];
        assert_eq!(reference.value, "geom_B.tgc");
        assert_eq!(reference.files, [FileRef::parse("/m/geom_B.tgc")]);
    }

    #[test]
    fn test_event_sources_substitute() {
        let fs = MemoryFileSystem::new()
            .with_file(
                "/m/model.tcf",
                "Event File == events.tef\nBC Database == bc_~ARI~.csv\n",
            )
            .with_file(
                "/m/events.tef",
                "Define Event == Q100\nBC Event Source == ~ARI~ | 100y\nEnd Define\n",
            )
            .with_file("/m/bc_100y.csv", "Name,Source\nFC01,flow_~ARI~.csv\n");
        let model = Model::load("/m/model.tcf", fs, FileGis).unwrap();
        let state = model.context(RunContext::new().event("Q100")).unwrap();
        assert_eq!(state.value("BC Database"), Some("bc_100y.csv"));
        assert_eq!(state.event_sources().get("~ARI~").map(SmolStr::as_str), Some("100y"));
    }
}
