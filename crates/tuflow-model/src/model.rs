//! The build-state model: an arena of control files, inputs and databases.
//!
//! Every node is owned by the [`Model`]; nodes refer to each other through
//! ids. Edits go through `Model` methods, which record each edit in the
//! change log so it can be undone.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use tracing::debug;
use tuflow_syntax::{normalize_key, BlockTracker, Command, FileRef, Scope, ScopeKind, Wildcards};

use crate::changes::{Change, ChangeKind, ChangeLog, PriorState, Transaction};
use crate::conditions::Condition;
use crate::config::{ModelConfig, ModelSettings};
use crate::control_file::ControlFile;
use crate::database::{index_key, Database, Entry, Row};
use crate::dispatch;
use crate::error::{ModelError, Result};
use crate::ids::{ChildRef, ControlFileId, DatabaseId, InputId};
use crate::input::{Input, InputKind, Position};
use crate::query::InputQuery;
use crate::run_state::RunContext;
use crate::services::{FileSystem, GeometryType, GisService};

/// Keys whose values feed the model configuration.
const CONFIG_KEYS: &[&str] = &[
    "SPATIAL DATABASE",
    "GIS FORMAT",
    "GRID FORMAT",
    "MODEL SCENARIOS",
    "MODEL EVENTS",
];

/// A loaded TUFLOW model.
pub struct Model {
    pub(crate) fs: Box<dyn FileSystem>,
    pub(crate) gis: Box<dyn GisService>,
    pub(crate) settings: ModelSettings,
    pub(crate) wildcards: Wildcards,
    pub(crate) config: ModelConfig,
    pub(crate) control_files: Vec<ControlFile>,
    pub(crate) databases: Vec<Database>,
    pub(crate) inputs: FxHashMap<InputId, Input>,
    pub(crate) next_input: u32,
    pub(crate) changes: ChangeLog,
    pub(crate) conditions: Vec<Condition>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("fs", &"<fs>")
            .field("gis", &"<gis>")
            .field("settings", &self.settings)
            .field("config", &self.config)
            .field("control_files", &self.control_files.len())
            .field("databases", &self.databases.len())
            .field("inputs", &self.inputs.len())
            .field("changes", &self.changes.transactions().len())
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

impl Model {
    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// The root control file.
    #[must_use]
    pub fn root(&self) -> &ControlFile {
        &self.control_files[0]
    }

    /// A control file by id.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownControlFile`] for foreign ids.
    pub fn control_file(&self, id: ControlFileId) -> Result<&ControlFile> {
        self.control_files
            .get(id.0 as usize)
            .ok_or(ModelError::UnknownControlFile(id))
    }

    pub(crate) fn control_file_mut(&mut self, id: ControlFileId) -> Result<&mut ControlFile> {
        self.control_files
            .get_mut(id.0 as usize)
            .ok_or(ModelError::UnknownControlFile(id))
    }

    /// An input by id.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownInput`] for foreign ids.
    pub fn input(&self, id: InputId) -> Result<&Input> {
        self.inputs.get(&id).ok_or(ModelError::UnknownInput(id))
    }

    pub(crate) fn input_mut(&mut self, id: InputId) -> Result<&mut Input> {
        self.inputs.get_mut(&id).ok_or(ModelError::UnknownInput(id))
    }

    /// A database by id.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownDatabase`] for foreign ids.
    pub fn database(&self, id: DatabaseId) -> Result<&Database> {
        self.databases
            .get(id.0 as usize)
            .ok_or(ModelError::UnknownDatabase(id))
    }

    pub(crate) fn database_mut(&mut self, id: DatabaseId) -> Result<&mut Database> {
        self.databases
            .get_mut(id.0 as usize)
            .ok_or(ModelError::UnknownDatabase(id))
    }

    /// Inputs of a control file in file order.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownControlFile`] for foreign ids.
    pub fn inputs(&self, cf: ControlFileId) -> Result<Vec<&Input>> {
        let file = self.control_file(cf)?;
        Ok(file
            .inputs
            .iter()
            .filter_map(|id| self.inputs.get(id))
            .collect())
    }

    /// Control files reachable from the root, parents before children.
    #[must_use]
    pub fn control_files(&self) -> Vec<ControlFileId> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        self.collect_control_files(ControlFileId::ROOT, &mut out, &mut seen);
        out
    }

    fn collect_control_files(
        &self,
        cf: ControlFileId,
        out: &mut Vec<ControlFileId>,
        seen: &mut FxHashSet<ControlFileId>,
    ) {
        if !seen.insert(cf) {
            return;
        }
        out.push(cf);
        let Ok(file) = self.control_file(cf) else {
            return;
        };
        for id in &file.inputs {
            let Some(input) = self.inputs.get(id) else {
                continue;
            };
            for child in &input.children {
                if let ChildRef::ControlFile(child) = child {
                    self.collect_control_files(*child, out, seen);
                }
            }
        }
    }

    /// Databases reachable from the root.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseId> {
        let mut out = Vec::new();
        for cf in self.control_files() {
            for input in self.inputs(cf).unwrap_or_default() {
                for child in &input.children {
                    if let ChildRef::Database(db) = child {
                        if !out.contains(db) {
                            out.push(*db);
                        }
                    }
                }
            }
        }
        out
    }

    /// Conditions of the files the model currently references.
    ///
    /// Conditions of control files that are no longer reachable from the
    /// root (a retargeted or removed reference) are kept for undo but not
    /// reported.
    #[must_use]
    pub fn conditions(&self) -> Vec<&Condition> {
        let reachable: FxHashSet<ControlFileId> = self.control_files().into_iter().collect();
        self.conditions
            .iter()
            .filter(|c| match (c.input, c.control_file) {
                (Some(id), _) => self
                    .inputs
                    .get(&id)
                    .is_some_and(|input| reachable.contains(&input.parent)),
                (None, Some(cf)) => reachable.contains(&cf),
                (None, None) => true,
            })
            .collect()
    }

    /// Model-wide configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Host settings in effect.
    #[must_use]
    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// The change log.
    #[must_use]
    pub fn change_log(&self) -> &ChangeLog {
        &self.changes
    }

    /// Returns `true` if anything must be written.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.control_files()
            .iter()
            .any(|cf| self.control_files[cf.0 as usize].dirty)
            || self
                .databases()
                .iter()
                .any(|db| self.databases[db.0 as usize].dirty)
    }

    pub(crate) fn is_attached(&self, id: InputId) -> bool {
        self.inputs
            .get(&id)
            .and_then(|input| self.control_files.get(input.parent.0 as usize))
            .is_some_and(|cf| cf.inputs.contains(&id))
    }

    /// The control file holding `id` and the input's position in it.
    fn locate(&self, id: InputId) -> Result<(ControlFileId, usize)> {
        let input = self.input(id)?;
        let cf = input.parent;
        let index = self
            .control_file(cf)?
            .position(id)
            .ok_or(ModelError::NotInControlFile {
                input: id,
                control_file: cf,
            })?;
        Ok((cf, index))
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Inputs matching `query`, in model order.
    #[must_use]
    pub fn find_inputs(&self, query: &InputQuery) -> Vec<InputId> {
        let mut out = Vec::new();
        for cf in self.control_files() {
            for input in self.inputs(cf).unwrap_or_default() {
                if query.matches(input) {
                    out.push(input.id);
                }
            }
        }
        out
    }

    /// The first input matching `query`.
    #[must_use]
    pub fn find_input(&self, query: &InputQuery) -> Option<InputId> {
        self.find_inputs(query).into_iter().next()
    }

    /// The input that sets a singleton command such as `Output Folder`.
    ///
    /// Without a context, several definitions are only accepted when all are
    /// global (the last one wins). With a context the last active definition
    /// wins.
    ///
    /// # Errors
    /// Returns [`ModelError::AmbiguousCommand`] when definitions live in
    /// different branches and no context is given.
    pub fn get_singleton(&self, lhs: &str, context: Option<&RunContext>) -> Result<Option<InputId>> {
        let key = normalize_key(lhs);
        let candidates: Vec<&Input> = self
            .control_files()
            .into_iter()
            .flat_map(|cf| self.inputs(cf).unwrap_or_default())
            .filter(|input| input.kind.is_command() && input.key() == key)
            .collect();
        match context {
            Some(context) => {
                let selection = context.selection();
                Ok(candidates
                    .iter()
                    .rev()
                    .find(|input| {
                        input.scope.is_active(&selection)
                            && self.control_file_active(input.parent, context)
                    })
                    .map(|input| input.id))
            }
            None => match candidates.as_slice() {
                [] => Ok(None),
                [only] => Ok(Some(only.id)),
                many if many.iter().all(|i| i.scope.is_global()) => {
                    Ok(many.last().map(|i| i.id))
                }
                many => Err(ModelError::AmbiguousCommand {
                    command: SmolStr::new(lhs.trim()),
                    count: many.len(),
                }),
            },
        }
    }

    /// Returns `true` if every input on the path from the root to `cf` is
    /// active under `context`.
    pub(crate) fn control_file_active(&self, cf: ControlFileId, context: &RunContext) -> bool {
        let selection = context.selection();
        let mut next = Some(cf);
        while let Some(id) = next {
            let Ok(file) = self.control_file(id) else {
                return false;
            };
            if !file.scope.is_active(&selection) {
                return false;
            }
            next = file
                .parent
                .and_then(|input| self.inputs.get(&input))
                .map(|input| input.parent);
        }
        true
    }

    /// Files referenced by the inputs of one control file, including files
    /// named in layer attributes.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownControlFile`] for foreign ids.
    pub fn files(&self, cf: ControlFileId) -> Result<Vec<FileRef>> {
        let mut out: Vec<FileRef> = Vec::new();
        for input in self.inputs(cf)? {
            let attribute = input.attribute_files.iter().cloned().map(FileRef::Path);
            for file in input.files.iter().cloned().chain(attribute) {
                if !out.contains(&file) {
                    out.push(file);
                }
            }
        }
        Ok(out)
    }

    /// Geometry of each layer an input reads.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownInput`] for foreign ids.
    pub fn geometry_types(&self, id: InputId) -> Result<Vec<(FileRef, Option<GeometryType>)>> {
        let input = self.input(id)?;
        Ok(input
            .files
            .iter()
            .map(|file| (file.clone(), self.gis.geometry_type(file)))
            .collect())
    }

    // ---------------------------------------------------------------------
    // Bookkeeping
    // ---------------------------------------------------------------------

    pub(crate) fn new_input(
        &mut self,
        cf: ControlFileId,
        command: Command,
        scope: tuflow_syntax::ScopeList,
    ) -> InputId {
        let id = InputId(self.next_input);
        self.next_input += 1;
        let kind = dispatch::classify(&command);
        self.inputs
            .insert(id, Input::new(id, cf, command, kind, scope));
        id
    }

    /// Marks a control file and every ancestor as needing a write.
    pub(crate) fn mark_dirty(&mut self, cf: ControlFileId) {
        let mut next = Some(cf);
        while let Some(id) = next {
            let Some(file) = self.control_files.get_mut(id.0 as usize) else {
                break;
            };
            file.dirty = true;
            next = file
                .parent
                .and_then(|input| self.inputs.get(&input))
                .map(|input| input.parent);
        }
    }

    fn touch_input(&mut self, id: InputId) {
        let Some(input) = self.inputs.get_mut(&id) else {
            return;
        };
        input.dirty = true;
        let cf = input.parent;
        let fragment = input.trd_source.clone();
        if let (Some(fragment), Some(file)) =
            (fragment, self.control_files.get_mut(cf.0 as usize))
        {
            file.fragments.entry(fragment).or_default().dirty = true;
        }
        self.mark_dirty(cf);
    }

    /// Recomputes block scopes after lines were added or removed.
    pub(crate) fn rescope(&mut self, cf: ControlFileId) {
        let Some(file) = self.control_files.get(cf.0 as usize) else {
            return;
        };
        let mut tracker = BlockTracker::new();
        for (line, id) in file.inputs.iter().enumerate() {
            if let Some(input) = self.inputs.get_mut(id) {
                input.scope = tracker.feed(&input.command, line + 1);
            }
        }
    }

    pub(crate) fn clear_conditions(&mut self, id: InputId) {
        self.conditions.retain(|c| c.input != Some(id));
    }

    pub(crate) fn affects_config(input: &Input) -> bool {
        matches!(input.kind, InputKind::Variable | InputKind::Event)
            || (input.kind == InputKind::ControlFile && input.key() == "EVENT FILE")
            || CONFIG_KEYS.contains(&input.key().as_str())
    }

    fn snapshot(&self, id: InputId) -> Result<Box<Input>> {
        Ok(Box::new(self.input(id)?.clone()))
    }

    fn record(&mut self, kind: ChangeKind, cf: ControlFileId, input: InputId, prior: PriorState) {
        let conditions = self
            .conditions
            .iter()
            .filter(|c| c.input == Some(input))
            .cloned()
            .collect();
        self.changes.record(Change {
            kind,
            control_file: cf,
            input,
            prior,
            conditions,
        });
    }

    /// Runs `edit` as one transaction. A failed edit is rolled back.
    fn transaction<T>(&mut self, edit: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let outer = self.changes.begin();
        let result = edit(self);
        if !outer {
            return result;
        }
        match result {
            Ok(value) => {
                self.changes.commit();
                Ok(value)
            }
            Err(err) => {
                if let Some(tx) = self.changes.abandon() {
                    self.revert(tx);
                }
                Err(err)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Editing
    // ---------------------------------------------------------------------

    fn parse_line(text: &str) -> Result<Command> {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.contains('\n') {
            return Err(ModelError::InvalidInputText(text.to_string()));
        }
        Ok(Command::parse(text))
    }

    /// Inserts an input at `index` and resolves it.
    fn attach(&mut self, cf: ControlFileId, id: InputId, index: usize) -> Result<()> {
        let file = self.control_file_mut(cf)?;
        let index = index.min(file.inputs.len());
        file.inputs.insert(index, id);
        self.input_mut(id)?.parent = cf;
        self.record(ChangeKind::AddInput, cf, id, PriorState::Added);
        if self.input(id)?.kind == InputKind::Block {
            self.rescope(cf);
        } else {
            let scope = self.scope_at(cf, index);
            self.input_mut(id)?.scope = scope;
        }
        self.touch_input(id);
        self.resolve_input(id)?;
        if Self::affects_config(self.input(id)?) {
            self.propagate_config();
        }
        Ok(())
    }

    /// Scope a line at `index` of `cf` would get.
    fn scope_at(&self, cf: ControlFileId, index: usize) -> tuflow_syntax::ScopeList {
        let Ok(file) = self.control_file(cf) else {
            return tuflow_syntax::ScopeList::global();
        };
        let mut tracker = BlockTracker::new();
        for (line, id) in file.inputs.iter().take(index).enumerate() {
            if let Some(input) = self.inputs.get(id) {
                tracker.feed(&input.command, line + 1);
            }
        }
        tracker.current()
    }

    /// Appends a line to the end of a control file.
    ///
    /// # Errors
    /// Fails for unknown control files, multi-line text, and on fatal load
    /// errors of files the new line references.
    pub fn append_input(&mut self, cf: ControlFileId, text: &str) -> Result<InputId> {
        let command = Self::parse_line(text)?;
        self.transaction(|model| {
            let index = model.control_file(cf)?.inputs.len();
            let id = model.new_input(cf, command, tuflow_syntax::ScopeList::global());
            model.attach(cf, id, index)?;
            debug!("appended {id} to {cf}");
            Ok(id)
        })
    }

    /// Inserts a line next to `reference`, with `gap` blank lines between.
    ///
    /// Lines inserted among `Read File` content belong to that fragment. The
    /// new line takes the reference's indentation when it has none.
    ///
    /// # Errors
    /// Fails when `reference` is not attached to a control file.
    pub fn insert_input(
        &mut self,
        reference: InputId,
        text: &str,
        position: Position,
        gap: usize,
    ) -> Result<InputId> {
        let mut command = Self::parse_line(text)?;
        let (cf, index) = self.locate(reference)?;
        let anchor = self.input(reference)?;
        let fragment = match anchor.kind {
            InputKind::ReadFile => None,
            _ => anchor.trd_source.clone(),
        };
        if command.indent().is_empty() && !anchor.command.indent().is_empty() {
            command = Command::parse(&format!("{}{}", anchor.command.indent(), command.raw()));
        }
        self.transaction(|model| {
            let id = model.new_input(cf, command, tuflow_syntax::ScopeList::global());
            model.input_mut(id)?.trd_source.clone_from(&fragment);
            let (first_blank, new_at) = match position {
                Position::Before => (index, index),
                Position::After => (index + 1, index + 1 + gap),
            };
            if position == Position::Before {
                model.attach(cf, id, new_at)?;
            }
            let blank_start = if position == Position::Before {
                first_blank + 1
            } else {
                first_blank
            };
            for offset in 0..gap {
                let blank = model.new_input(cf, Command::blank(), tuflow_syntax::ScopeList::global());
                model.input_mut(blank)?.trd_source.clone_from(&fragment);
                model.attach(cf, blank, blank_start + offset)?;
            }
            if position == Position::After {
                model.attach(cf, id, new_at)?;
            }
            Ok(id)
        })
    }

    /// Places an existing input next to `reference`.
    ///
    /// A detached input (removed earlier) is reused as is, keeping its id.
    /// An input still attached somewhere is duplicated under a new id.
    ///
    /// # Errors
    /// Fails for unknown ids or a detached `reference`.
    pub fn insert_existing(
        &mut self,
        reference: InputId,
        existing: InputId,
        position: Position,
    ) -> Result<InputId> {
        let (cf, index) = self.locate(reference)?;
        let source = self.input(existing)?;
        let reuse = !self.is_attached(existing);
        let command = source.command.clone();
        let index = match position {
            Position::Before => index,
            Position::After => index + 1,
        };
        self.transaction(|model| {
            let id = if reuse {
                existing
            } else {
                model.new_input(cf, command, tuflow_syntax::ScopeList::global())
            };
            model.attach(cf, id, index)?;
            Ok(id)
        })
    }

    /// Detaches an input from its control file.
    ///
    /// The input stays in the arena so undo can put it back.
    ///
    /// # Errors
    /// Fails when the input is not attached.
    pub fn remove_input(&mut self, id: InputId) -> Result<()> {
        let (cf, index) = self.locate(id)?;
        self.transaction(|model| {
            model.touch_input(id);
            model.control_file_mut(cf)?.inputs.remove(index);
            model.record(ChangeKind::RemoveInput, cf, id, PriorState::Removed { index });
            let input = model.input(id)?;
            let block = input.kind == InputKind::Block;
            let config = Self::affects_config(input);
            if block {
                model.rescope(cf);
            }
            model.clear_conditions(id);
            if config {
                model.propagate_config();
            }
            debug!("removed {id} from {cf}");
            Ok(())
        })
    }

    /// Turns an input into a comment, keeping its id.
    ///
    /// # Errors
    /// Returns [`ModelError::AlreadyCommented`] for comment, blank, block
    /// and unparsed lines.
    pub fn comment_out(&mut self, id: InputId) -> Result<()> {
        let (cf, _) = self.locate(id)?;
        let input = self.input(id)?;
        if !input.kind.is_command() {
            return Err(ModelError::AlreadyCommented(id));
        }
        let config = Self::affects_config(input);
        let prior = self.snapshot(id)?;
        self.transaction(|model| {
            let input = model.input_mut(id)?;
            input.command = input.command.commented();
            input.kind = InputKind::Comment;
            input.children.clear();
            input.files.clear();
            input.file_scopes.clear();
            input.attribute_files.clear();
            input.has_missing_files = false;
            model.record(ChangeKind::CommentOut, cf, id, PriorState::Input(prior));
            model.touch_input(id);
            model.clear_conditions(id);
            if config {
                model.propagate_config();
            }
            Ok(())
        })
    }

    /// Turns a commented-out command back into an input, keeping its id.
    ///
    /// # Errors
    /// Returns [`ModelError::NotACommentInput`] unless the input is a
    /// comment whose text parses as a command.
    pub fn uncomment(&mut self, id: InputId) -> Result<()> {
        let (cf, _) = self.locate(id)?;
        let input = self.input(id)?;
        let restored = match input.kind {
            InputKind::Comment => input.command.uncommented(),
            _ => None,
        }
        .filter(Command::is_setting)
        .ok_or(ModelError::NotACommentInput(id))?;
        let prior = self.snapshot(id)?;
        self.transaction(|model| {
            let input = model.input_mut(id)?;
            input.kind = dispatch::classify(&restored);
            input.command = restored;
            model.record(ChangeKind::Uncomment, cf, id, PriorState::Input(prior));
            model.touch_input(id);
            model.resolve_input(id)?;
            if Self::affects_config(model.input(id)?) {
                model.propagate_config();
            }
            Ok(())
        })
    }

    /// Replaces the value of an input and reloads what it references.
    ///
    /// # Errors
    /// Fails when the input is not attached or a fatal load error occurs.
    pub fn set_rhs(&mut self, id: InputId, rhs: &str) -> Result<()> {
        self.update_command(id, ChangeKind::UpdateValue, |command| command.set_rhs(rhs))
    }

    /// Replaces the command name of an input; the kind is re-dispatched.
    ///
    /// # Errors
    /// Fails when the input is not attached or a fatal load error occurs.
    pub fn set_command(&mut self, id: InputId, lhs: &str) -> Result<()> {
        self.update_command(id, ChangeKind::UpdateCommand, |command| command.set_lhs(lhs))
    }

    fn update_command(
        &mut self,
        id: InputId,
        kind: ChangeKind,
        edit: impl FnOnce(&mut Command),
    ) -> Result<()> {
        let (cf, _) = self.locate(id)?;
        let before = self.input(id)?;
        let was_config = Self::affects_config(before);
        let was_block = before.kind == InputKind::Block;
        let prior = self.snapshot(id)?;
        self.transaction(|model| {
            let input = model.input_mut(id)?;
            edit(&mut input.command);
            input.kind = dispatch::classify(&input.command);
            let is_block = input.kind == InputKind::Block;
            model.record(kind, cf, id, PriorState::Input(prior));
            if was_block || is_block {
                model.rescope(cf);
            }
            model.touch_input(id);
            model.resolve_input(id)?;
            if was_config || Self::affects_config(model.input(id)?) {
                model.propagate_config();
            }
            Ok(())
        })
    }

    /// Moves an input under a scenario or event scope by wrapping it in an
    /// `If` block. A negated scope puts the input in the `Else` branch.
    ///
    /// # Errors
    /// Returns [`ModelError::UnsupportedScope`] for scopes other than
    /// known scenario and event scopes.
    pub fn set_scope(&mut self, id: InputId, scope: &Scope) -> Result<()> {
        if !matches!(scope.kind, ScopeKind::Scenario | ScopeKind::Event)
            || !scope.known
            || scope.names.is_empty()
        {
            return Err(ModelError::UnsupportedScope(SmolStr::new(scope.to_string())));
        }
        let (cf, _) = self.locate(id)?;
        let input = self.input(id)?;
        let prior = input.scope.clone();
        let indent = input.command.indent().to_string();
        let names: Vec<&str> = scope.names.iter().map(SmolStr::as_str).collect();
        let opener = format!("{indent}If {} == {}", scope.kind.keyword(), names.join(" | "));
        self.transaction(|model| {
            model.record(ChangeKind::SetScope, cf, id, PriorState::Scope(prior));
            let (_, index) = model.locate(id)?;
            let open = model.new_input(cf, Command::parse(&opener), tuflow_syntax::ScopeList::global());
            model.attach(cf, open, index)?;
            if scope.negated {
                let other = model.new_input(
                    cf,
                    Command::parse(&format!("{indent}Else")),
                    tuflow_syntax::ScopeList::global(),
                );
                model.attach(cf, other, index + 1)?;
            }
            let (_, index) = model.locate(id)?;
            let close = model.new_input(
                cf,
                Command::parse(&format!("{indent}End If")),
                tuflow_syntax::ScopeList::global(),
            );
            model.attach(cf, close, index + 1)?;
            model.touch_input(id);
            Ok(())
        })
    }

    /// Adds or replaces a database entry.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownDatabase`] for foreign ids.
    pub fn set_database_entry<S: AsRef<str>>(
        &mut self,
        database: DatabaseId,
        index: &str,
        values: &[S],
    ) -> Result<()> {
        let db = self.database(database)?;
        let key = index_key(index);
        let prior = db
            .entries
            .get(&key)
            .map(|entry| (Box::new(entry.clone()), db.row_of(&key).unwrap_or(db.rows.len())));
        let parent = db.parent;
        let cf = self.input(parent)?.parent;
        let mut entry = Entry::from_fields(index, values);
        self.transaction(|model| {
            model.resolve_entry(database, &mut entry);
            let db = model.database_mut(database)?;
            if db.row_of(&key).is_none() {
                db.rows.push(Row::Entry(key.clone()));
            }
            db.entries.insert(key.clone(), entry);
            db.dirty = true;
            model.record(
                ChangeKind::DatabaseChange,
                cf,
                parent,
                PriorState::Entry {
                    database,
                    key,
                    prior,
                },
            );
            Ok(())
        })
    }

    /// Removes a database entry.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownEntry`] when the index does not exist.
    pub fn remove_database_entry(&mut self, database: DatabaseId, index: &str) -> Result<()> {
        let db = self.database(database)?;
        let key = index_key(index);
        let (Some(entry), Some(row)) = (db.entries.get(&key), db.row_of(&key)) else {
            return Err(ModelError::UnknownEntry {
                database,
                index: SmolStr::new(index),
            });
        };
        let prior = Some((Box::new(entry.clone()), row));
        let parent = db.parent;
        let cf = self.input(parent)?.parent;
        self.transaction(|model| {
            model.clear_entry_conditions(database, &key);
            let db = model.database_mut(database)?;
            db.entries.shift_remove(&key);
            db.rows.remove(row);
            db.dirty = true;
            model.record(
                ChangeKind::DatabaseChange,
                cf,
                parent,
                PriorState::Entry {
                    database,
                    key,
                    prior,
                },
            );
            Ok(())
        })
    }

    /// Sets a user variable in the root control file.
    ///
    /// An existing global `Set Variable` line for the name is updated;
    /// otherwise a new line goes after the last `Set Variable` line, or at
    /// the top of the file.
    ///
    /// # Errors
    /// Propagates edit errors.
    pub fn add_variable(&mut self, name: &str, value: &str) -> Result<InputId> {
        let name = name.trim();
        let key = normalize_key(name);
        let root = self.root();
        let mut existing = None;
        let mut last_variable = None;
        for (index, id) in root.inputs.iter().enumerate() {
            let Some(input) = self.inputs.get(id) else {
                continue;
            };
            if input.kind != InputKind::Variable {
                continue;
            }
            last_variable = Some(index);
            if input.scope.is_global()
                && input
                    .command
                    .variable_name()
                    .is_some_and(|n| normalize_key(&n) == key)
            {
                existing = Some(*id);
            }
        }
        if let Some(id) = existing {
            self.set_rhs(id, value)?;
            return Ok(id);
        }
        let command = Command::parse(&format!("Set Variable {name} == {value}"));
        self.transaction(|model| {
            let id = model.new_input(ControlFileId::ROOT, command, tuflow_syntax::ScopeList::global());
            let index = last_variable.map_or(0, |i| i + 1);
            model.attach(ControlFileId::ROOT, id, index)?;
            Ok(id)
        })
    }

    /// Removes every `Set Variable` line for `name`. Returns how many lines
    /// were removed.
    ///
    /// # Errors
    /// Propagates edit errors.
    pub fn remove_variable(&mut self, name: &str) -> Result<usize> {
        let key = normalize_key(name);
        let ids = self.find_inputs(&InputQuery::new().kind(InputKind::Variable).filter(
            move |input| {
                input
                    .command()
                    .variable_name()
                    .is_some_and(|n| normalize_key(&n) == key)
            },
        ));
        self.transaction(|model| {
            for id in &ids {
                model.remove_input(*id)?;
            }
            Ok(ids.len())
        })
    }

    // ---------------------------------------------------------------------
    // Undo
    // ---------------------------------------------------------------------

    /// Reverses the most recent transaction.
    ///
    /// # Errors
    /// Returns [`ModelError::NothingToUndo`] when the log is empty.
    pub fn undo(&mut self) -> Result<()> {
        let tx = self.changes.pop(None).ok_or(ModelError::NothingToUndo)?;
        debug!("undo {:?} ({} changes)", tx.id, tx.changes.len());
        self.revert(tx);
        Ok(())
    }

    /// Reverses the most recent transaction that only touched `cf`.
    ///
    /// # Errors
    /// Returns [`ModelError::NothingToUndo`] when there is none.
    pub fn undo_in(&mut self, cf: ControlFileId) -> Result<()> {
        self.control_file(cf)?;
        let tx = self.changes.pop(Some(cf)).ok_or(ModelError::NothingToUndo)?;
        debug!("undo {:?} in {cf}", tx.id);
        self.revert(tx);
        Ok(())
    }

    /// Reverses every transaction since the last write. Returns how many
    /// were undone.
    ///
    /// # Errors
    /// Propagates undo errors.
    pub fn reset(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.changes.has_unsealed(None) {
            self.undo()?;
            count += 1;
        }
        Ok(count)
    }

    /// Reverses every transaction since the last write that only touched
    /// `cf`.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownControlFile`] for foreign ids.
    pub fn reset_in(&mut self, cf: ControlFileId) -> Result<usize> {
        self.control_file(cf)?;
        let mut count = 0;
        while self.changes.has_unsealed(Some(cf)) {
            self.undo_in(cf)?;
            count += 1;
        }
        Ok(count)
    }

    fn revert(&mut self, tx: Transaction) {
        let mut touched: Vec<ControlFileId> = Vec::new();
        let mut config = false;
        for change in tx.changes.into_iter().rev() {
            let cf = change.control_file;
            if let Some(input) = self.inputs.get(&change.input) {
                config |= Self::affects_config(input);
            }
            match change.prior {
                PriorState::Input(prior) => {
                    config |= Self::affects_config(&prior);
                    self.inputs.insert(change.input, *prior);
                }
                PriorState::Added => {
                    if let Some(file) = self.control_files.get_mut(cf.0 as usize) {
                        file.inputs.retain(|id| *id != change.input);
                    }
                }
                PriorState::Removed { index } => {
                    if let Some(file) = self.control_files.get_mut(cf.0 as usize) {
                        let index = index.min(file.inputs.len());
                        file.inputs.insert(index, change.input);
                    }
                    if let Some(input) = self.inputs.get_mut(&change.input) {
                        input.parent = cf;
                    }
                }
                PriorState::Scope(scope) => {
                    if let Some(input) = self.inputs.get_mut(&change.input) {
                        input.scope = scope;
                    }
                }
                PriorState::Entry {
                    database,
                    key,
                    prior,
                } => {
                    self.revert_entry(database, key, prior);
                    continue;
                }
            }
            self.clear_conditions(change.input);
            self.conditions.extend(change.conditions);
            if !touched.contains(&cf) {
                touched.push(cf);
            }
            self.touch_input(change.input);
        }
        for cf in touched {
            self.rescope(cf);
        }
        if config {
            self.propagate_config();
        }
    }

    fn revert_entry(
        &mut self,
        database: DatabaseId,
        key: SmolStr,
        mut prior: Option<(Box<Entry>, usize)>,
    ) {
        self.clear_entry_conditions(database, &key);
        if let Some((entry, _)) = prior.as_mut() {
            self.resolve_entry(database, entry);
        }
        let Some(db) = self.databases.get_mut(database.0 as usize) else {
            return;
        };
        db.dirty = true;
        match prior {
            Some((entry, row)) => {
                if db.row_of(&key).is_none() {
                    let row = row.min(db.rows.len());
                    db.rows.insert(row, Row::Entry(key.clone()));
                }
                if db.entries.contains_key(&key) {
                    db.entries.insert(key, *entry);
                } else {
                    let position = db.rows[..db.row_of(&key).unwrap_or(0)]
                        .iter()
                        .filter(|r| matches!(r, Row::Entry(_)))
                        .count();
                    let position = position.min(db.entries.len());
                    db.entries.shift_insert(position, key, *entry);
                }
            }
            None => {
                db.entries.shift_remove(&key);
                db.rows.retain(|r| !matches!(r, Row::Entry(k) if *k == key));
            }
        }
    }
}
