//! Loading control files, fragments and databases into the arena.
//!
//! Loading a file happens in two passes. The first pass parses every line,
//! splices `Read File` fragments in place and absorbs model configuration
//! (variables, spatial database, scenario and event names). The second pass
//! resolves the files each input references and loads child control files
//! and databases depth first.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, warn};
use tuflow_syntax::{
    expand, expand_event_tokens, extract_names_from_pattern, resolve_scope, BlockIssue,
    BlockToken, BlockTracker, Command, FileRef, PartKind, Scope, ScopeKind, ScopeList, Variables,
    Wildcards,
};

use crate::changes::ChangeLog;
use crate::conditions::{Condition, ConditionCode};
use crate::config::{GisFormat, ModelConfig, ModelSettings};
use crate::control_file::{ControlFile, Fragment, LoadState};
use crate::database::{index_key, Database, DatabaseKind, Entry, TableFormat};
use crate::dispatch;
use crate::error::{ModelError, Result};
use crate::ids::{ChildRef, ControlFileId, DatabaseId, InputId};
use crate::input::{Input, InputKind};
use crate::model::Model;
use crate::services::{FileGis, FileSystem, GisService, StdFileSystem};

/// Grid extension assumed when neither the value nor `Grid Format` names one.
const DEFAULT_GRID_EXTENSION: &str = "tif";

impl Model {
    /// Loads the model rooted at `path`, reading `tuflow-model.toml` from the
    /// root's directory when present.
    ///
    /// # Errors
    /// Returns [`ModelError::RootNotFound`] when the root does not exist,
    /// [`ModelError::NestedReadFile`] for a `Read File` inside a fragment and
    /// [`ModelError::Io`] when an existing file cannot be read.
    pub fn load(
        path: impl AsRef<Path>,
        fs: impl FileSystem + 'static,
        gis: impl GisService + 'static,
    ) -> Result<Model> {
        let dir = path.as_ref().parent().unwrap_or_else(|| Path::new(""));
        let settings = ModelSettings::load(&fs, dir);
        Self::load_with_settings(path, fs, gis, settings)
    }

    /// Loads the model from disk with the file-name based GIS service.
    ///
    /// # Errors
    /// See [`Model::load`].
    pub fn open(path: impl AsRef<Path>) -> Result<Model> {
        Self::load(path, StdFileSystem::new(), FileGis)
    }

    /// Loads the model with explicit settings.
    ///
    /// # Errors
    /// See [`Model::load`].
    pub fn load_with_settings(
        path: impl AsRef<Path>,
        fs: impl FileSystem + 'static,
        gis: impl GisService + 'static,
        settings: ModelSettings,
    ) -> Result<Model> {
        let path = FileRef::parse(&path.as_ref().to_string_lossy())
            .resolved_against(Path::new(""))
            .path()
            .to_path_buf();
        if !fs.exists(&path) {
            return Err(ModelError::RootNotFound(path));
        }
        let wildcards = Wildcards::new(&settings.wildcards).unwrap_or_else(|err| {
            warn!("Invalid wildcard pattern, using defaults: {err}");
            Wildcards::default()
        });
        let root_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut model = Model {
            fs: Box::new(fs),
            gis: Box::new(gis),
            settings,
            wildcards,
            config: ModelConfig::new(root_dir),
            control_files: vec![ControlFile::new(
                ControlFileId::ROOT,
                path,
                None,
                ScopeList::global(),
            )],
            databases: Vec::new(),
            inputs: FxHashMap::default(),
            next_input: 0,
            changes: ChangeLog::new(),
            conditions: Vec::new(),
        };
        model.load_control_file(ControlFileId::ROOT)?;
        model.propagate_config();
        debug!(
            "loaded {} control files, {} databases, {} inputs",
            model.control_files.len(),
            model.databases.len(),
            model.inputs.len()
        );
        Ok(model)
    }

    /// Rebuilds the model configuration from every reachable control file
    /// and re-resolves the references that depend on it.
    pub fn propagate_config(&mut self) {
        let mut config = ModelConfig::new(self.config.root_dir.clone());
        for cf in self.control_files() {
            let Ok(file) = self.control_file(cf) else {
                continue;
            };
            let dir = file.dir().to_path_buf();
            for id in &file.inputs {
                if let Some(input) = self.inputs.get(id) {
                    absorb_config(&mut config, input, &dir);
                }
            }
        }
        self.config = config;

        let dependent: Vec<InputId> = self
            .control_files()
            .into_iter()
            .flat_map(|cf| self.inputs(cf).unwrap_or_default())
            .filter(|input| depends_on_config(input))
            .map(|input| input.id)
            .collect();
        for id in dependent {
            if let Err(err) = self.resolve_input(id) {
                warn!("Failed to re-resolve {id}: {err}");
            }
        }
        for db in self.databases() {
            self.resolve_entries(db);
        }
    }

    fn load_control_file(&mut self, cf: ControlFileId) -> Result<()> {
        let path = self.control_file(cf)?.path.clone();
        if !self.fs.exists(&path) {
            self.control_file_mut(cf)?.state = LoadState::NotFound;
            return Ok(());
        }
        debug!("loading {}", path.display());
        self.control_file_mut(cf)?.state = LoadState::Loading;
        let text = self
            .fs
            .read_to_string(&path)
            .map_err(|err| ModelError::io(&path, err))?;
        self.read_lines(cf, &path, &text)?;

        let ids = self.control_file(cf)?.inputs.clone();
        for id in ids {
            self.resolve_input(id)?;
        }
        self.control_file_mut(cf)?.state = LoadState::Loaded;
        Ok(())
    }

    /// First pass: lines, fragments, configuration.
    fn read_lines(&mut self, cf: ControlFileId, path: &Path, text: &str) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let line_ending = if text.contains("\r\n") { "\r\n" } else { "\n" };
        self.control_file_mut(cf)?.line_ending = line_ending;

        let mut tracker = BlockTracker::new();
        let mut issues: Vec<(PathBuf, BlockIssue)> = Vec::new();
        let mut ids = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let command = Command::parse(raw);
            let scope = tracker.feed(&command, index + 1);
            let id = self.new_input(cf, command, scope);
            self.input_mut(id)?.line = index + 1;
            ids.push(id);
            if self.input(id)?.kind != InputKind::ReadFile {
                continue;
            }
            let Some(fragment) = self.first_reference(id, &dir) else {
                continue;
            };
            let exists = self.fs.exists(&fragment);
            self.control_file_mut(cf)?
                .fragments
                .insert(fragment.clone(), Fragment { exists, dirty: false });
            if !exists {
                continue;
            }
            debug!("inlining {}", fragment.display());
            let content = self
                .fs
                .read_to_string(&fragment)
                .map_err(|err| ModelError::io(&fragment, err))?;
            let mut fragment_tracker = std::mem::take(&mut tracker);
            let before = fragment_tracker.issues().len();
            for (line, raw) in content.lines().enumerate() {
                let command = Command::parse(raw);
                if dispatch::classify(&command) == InputKind::ReadFile {
                    return Err(ModelError::NestedReadFile {
                        fragment,
                        nested: PathBuf::from(command.value()),
                    });
                }
                let scope = fragment_tracker.feed(&command, line + 1);
                let inner = self.new_input(cf, command, scope);
                let input = self.input_mut(inner)?;
                input.line = line + 1;
                input.trd_source = Some(fragment.clone());
                ids.push(inner);
            }
            issues.extend(
                fragment_tracker.issues()[before..]
                    .iter()
                    .map(|issue| (fragment.clone(), issue.clone())),
            );
            tracker = fragment_tracker;
        }
        let fragment_issues: Vec<BlockIssue> = issues.iter().map(|(_, i)| i.clone()).collect();
        for issue in tracker.finish() {
            if !fragment_issues.contains(&issue) {
                issues.push((path.to_path_buf(), issue));
            }
        }
        for (file, issue) in issues {
            let code = match issue {
                BlockIssue::UnmatchedEnd { .. } => ConditionCode::UnmatchedBlockEnd,
                BlockIssue::OrphanElse { .. } => ConditionCode::OrphanElse,
                BlockIssue::Unclosed { .. } => ConditionCode::UnclosedBlock,
            };
            self.conditions.push(
                Condition::new(code, issue.to_string())
                    .in_file(file)
                    .in_control_file(cf),
            );
        }

        for id in &ids {
            let Some(input) = self.inputs.get(id) else {
                continue;
            };
            if input.kind == InputKind::Unparsed {
                let file = input.trd_source.clone().unwrap_or_else(|| path.to_path_buf());
                let message = format!(
                    "line {}: '{}' could not be interpreted",
                    input.line,
                    input.command.raw().trim()
                );
                self.conditions.push(
                    Condition::new(ConditionCode::UnparsedLine, message)
                        .in_file(file)
                        .for_input(*id),
                );
            }
            absorb_config(&mut self.config, input, &dir);
        }
        self.control_file_mut(cf)?.inputs = ids;
        Ok(())
    }

    fn first_reference(&self, id: InputId, dir: &Path) -> Option<PathBuf> {
        let input = self.inputs.get(&id)?;
        let part = input.command.rhs_parts().into_iter().next()?;
        Some(
            FileRef::parse(&part.text)
                .resolved_against(dir)
                .path()
                .to_path_buf(),
        )
    }

    /// Second pass for one input: referenced files, children, conditions.
    pub(crate) fn resolve_input(&mut self, id: InputId) -> Result<()> {
        self.conditions
            .retain(|c| c.input != Some(id) || !is_resolution_code(c.code));
        let input = self.input(id)?;
        let kind = input.kind;
        let key = input.key();
        let parent = input.parent;
        let input_scope = input.scope.clone();
        let command = input.command.clone();
        let cf = self.control_file(parent)?;
        let dir = cf.dir().to_path_buf();
        let cf_path = cf.path.clone();

        let input = self.input_mut(id)?;
        input.files.clear();
        input.file_scopes.clear();
        input.attribute_files.clear();
        input.has_missing_files = false;
        if matches!(kind, InputKind::ControlFile | InputKind::Database) {
            input.children.clear();
        }
        if !kind.references_files() {
            return Ok(());
        }

        let templates = self.templates(kind, &key, &command, &cf_path);
        let mut found: Vec<(FileRef, ScopeList)> = Vec::new();
        let mut conditions = Vec::new();
        let mut missing = false;
        for template in templates {
            let reference = FileRef::parse(&template).resolved_against(&dir);
            let pattern_text = reference.path().to_string_lossy().into_owned();
            if self.wildcards.is_wild(&pattern_text) {
                let matches = self.glob_reference(&reference);
                if matches.is_empty() {
                    missing = true;
                    conditions.push(Condition::new(
                        ConditionCode::NoWildcardMatch,
                        format!("no file matches '{template}'"),
                    ));
                }
                for matched in matches {
                    let (scope, unresolved) = self.file_scope(&pattern_text, &matched);
                    if unresolved {
                        conditions.push(Condition::new(
                            ConditionCode::UnresolvedScope,
                            format!("could not name the scope of '{}'", matched.display()),
                        ));
                    }
                    found.push((reference.with_path(matched), scope));
                }
                continue;
            }
            if !self.fs.exists(reference.path()) {
                missing = true;
                warn!("Missing file {}", reference.path().display());
                conditions.push(Condition::new(
                    ConditionCode::MissingFile,
                    format!("'{}' does not exist", reference.path().display()),
                ));
            } else if self.gis.layer_exists(&reference) == Some(false) {
                missing = true;
                conditions.push(Condition::new(
                    ConditionCode::MissingLayer,
                    format!("layer '{reference}' is not in its database"),
                ));
            }
            found.push((reference, ScopeList::global()));
        }
        for condition in conditions {
            self.conditions
                .push(condition.in_file(cf_path.clone()).for_input(id));
        }

        let mut attribute_files = Vec::new();
        if kind == InputKind::Gis && dispatch::has_attribute_files(&key) {
            for (file, _) in &found {
                if !self.fs.exists(file.path()) {
                    continue;
                }
                let base = file.path().parent().unwrap_or(&dir).to_path_buf();
                for name in self.gis.attribute_files(file) {
                    let path = FileRef::parse(&name).resolved_against(&base);
                    attribute_files.push(path.path().to_path_buf());
                }
            }
        }

        let input = self.input_mut(id)?;
        input.has_missing_files = missing;
        input.attribute_files = attribute_files;
        for (file, scope) in &found {
            input.files.push(file.clone());
            input.file_scopes.insert(file.clone(), scope.clone());
        }

        match kind {
            InputKind::ControlFile => {
                for (file, scope) in found {
                    let child = self.add_control_file(id, file.path(), input_scope.combined(&scope))?;
                    self.input_mut(id)?.children.push(ChildRef::ControlFile(child));
                }
            }
            InputKind::Database => {
                for (file, _) in found {
                    let db = self.add_database(id, file.path(), DatabaseKind::from_key(&key))?;
                    self.input_mut(id)?.children.push(ChildRef::Database(db));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Value parts an input reads files from.
    fn templates(&self, kind: InputKind, key: &str, command: &Command, cf_path: &Path) -> Vec<String> {
        let parts = command.rhs_parts();
        let single = self.single_variables();
        match kind {
            InputKind::ControlFile => {
                let Some(first) = parts.first() else {
                    return Vec::new();
                };
                if key == "ESTRY CONTROL FILE" && first.text.eq_ignore_ascii_case("AUTO") {
                    return vec![cf_path.with_extension("ecf").to_string_lossy().into_owned()];
                }
                vec![expand(&first.text, &single)]
            }
            InputKind::ReadFile | InputKind::Database | InputKind::File => parts
                .first()
                .filter(|p| p.kind != PartKind::Number && p.kind != PartKind::Keyword)
                .filter(|p| key != "SPATIAL DATABASE" || !p.text.eq_ignore_ascii_case("TCF"))
                .map(|p| expand(&p.text, &single))
                .into_iter()
                .collect(),
            InputKind::Gis | InputKind::Grid => parts
                .iter()
                .filter(|p| p.could_be_file())
                .map(|p| {
                    let text = expand(&p.text, &single);
                    reference_text(kind, &text, p.kind, &self.config)
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Variables that take exactly one value anywhere in the model.
    pub(crate) fn single_variables(&self) -> Variables {
        self.config
            .variables
            .iter()
            .filter_map(|(name, values)| match values.as_slice() {
                [value] => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    fn glob_reference(&self, reference: &FileRef) -> Vec<PathBuf> {
        let pattern = self
            .wildcards
            .globify(&reference.path().to_string_lossy());
        match self.fs.glob(&pattern) {
            Ok(paths) => paths,
            Err(err) => {
                warn!("Glob '{pattern}' failed: {err}");
                Vec::new()
            }
        }
    }

    /// Scopes implied by the placeholders a wildcard match filled in.
    /// The flag is set when some placeholder could not be named.
    fn file_scope(&self, template: &str, matched: &Path) -> (ScopeList, bool) {
        let resolved = matched.to_string_lossy();
        let mut scopes = Vec::new();
        let mut unknown = Vec::new();
        for (token, value) in extract_names_from_pattern(template, &resolved) {
            let mut scope = Scope::from_placeholder(&token);
            if value.is_empty() {
                unknown.push(scope);
            } else {
                scope.resolve(value);
                scopes.push(scope);
            }
        }
        let mut unresolved = false;
        if !unknown.is_empty() {
            let candidates = self.config.scope_candidates();
            resolve_scope(&mut unknown, template, &resolved, &candidates);
            unresolved = unknown.iter().any(|s| !s.known);
            scopes.extend(unknown);
        }
        (ScopeList::new(scopes), unresolved)
    }

    fn add_control_file(&mut self, parent: InputId, path: &Path, scope: ScopeList) -> Result<ControlFileId> {
        let id = ControlFileId(self.control_files.len() as u32);
        let cycle = self
            .control_files
            .iter()
            .any(|cf| cf.state == LoadState::Loading && cf.path == path);
        self.control_files
            .push(ControlFile::new(id, path.to_path_buf(), Some(parent), scope));
        if cycle {
            warn!("{} includes itself; not loading it again", path.display());
            self.control_file_mut(id)?.state = LoadState::NotFound;
            return Ok(id);
        }
        self.load_control_file(id)?;
        Ok(id)
    }

    fn add_database(&mut self, parent: InputId, path: &Path, kind: DatabaseKind) -> Result<DatabaseId> {
        let id = DatabaseId(self.databases.len() as u32);
        self.databases
            .push(Database::new(id, path.to_path_buf(), kind, parent));
        if !self.fs.exists(path) {
            self.database_mut(id)?.state = LoadState::NotFound;
            return Ok(id);
        }
        if self.settings.load_databases {
            self.load_database(id)?;
        }
        Ok(id)
    }

    fn load_database(&mut self, id: DatabaseId) -> Result<()> {
        let path = self.database(id)?.path.clone();
        debug!("loading database {}", path.display());
        let bytes = self
            .fs
            .read(&path)
            .map_err(|err| ModelError::io(&path, err))?;
        let format = TableFormat::sniff(&bytes);
        if format == TableFormat::Binary {
            let parent = self.database(id)?.parent;
            self.conditions.push(
                Condition::new(
                    ConditionCode::BinaryDatabase,
                    format!("'{}' is not a text table", path.display()),
                )
                .in_file(path)
                .for_input(parent),
            );
            let db = self.database_mut(id)?;
            db.format = format;
            db.state = LoadState::Loaded;
            return Ok(());
        }
        let text = String::from_utf8_lossy(&bytes);
        let db = self.database_mut(id)?;
        db.parse(&text, format);
        db.state = LoadState::Loaded;
        self.resolve_entries(id);
        Ok(())
    }

    pub(crate) fn resolve_entries(&mut self, id: DatabaseId) {
        let Ok(db) = self.database(id) else {
            return;
        };
        let path = db.path.clone();
        let keys: Vec<SmolStr> = db.entries.keys().cloned().collect();
        self.conditions.retain(|c| {
            c.path.as_deref() != Some(path.as_path()) || c.code != ConditionCode::MissingFile
        });
        for key in keys {
            let Some(mut entry) = self
                .databases
                .get(id.0 as usize)
                .and_then(|db| db.entries.get(&key))
                .cloned()
            else {
                continue;
            };
            self.resolve_entry(id, &mut entry);
            if let Some(db) = self.databases.get_mut(id.0 as usize) {
                db.entries.insert(key, entry);
            }
        }
    }

    /// Drops the conditions recorded for one entry of a database.
    pub(crate) fn clear_entry_conditions(&mut self, id: DatabaseId, key: &str) {
        let Ok(db) = self.database(id) else {
            return;
        };
        let path = db.path.clone();
        self.conditions.retain(|c| {
            c.path.as_deref() != Some(path.as_path()) || c.entry.as_deref() != Some(key)
        });
    }

    /// Resolves the files an entry references, one variant per event
    /// combination when the reference uses event source tokens.
    pub(crate) fn resolve_entry(&mut self, id: DatabaseId, entry: &mut Entry) {
        let Ok(db) = self.database(id) else {
            return;
        };
        let dir = db.dir().to_path_buf();
        let path = db.path.clone();
        let parent = db.parent;
        let key = index_key(&entry.index);
        self.clear_entry_conditions(id, &key);
        entry.files.clear();
        entry.file_scopes.clear();
        entry.has_missing_files = false;

        let events = &self.config.event_database;
        let mut variants: Vec<(FileRef, ScopeList)> = Vec::new();
        for template in entry.file_templates() {
            let tokens = events.tokens_in(template);
            if tokens.is_empty() {
                variants.push((
                    FileRef::parse(template).resolved_against(&dir),
                    ScopeList::global(),
                ));
                continue;
            }
            for combination in events.combinations_over(&tokens) {
                let text = expand_event_tokens(template, &combination);
                let scope: ScopeList = combination
                    .iter()
                    .filter_map(|(token, value)| events.event_for(token, value))
                    .map(|event| Scope::new(ScopeKind::Event, [event.clone()]))
                    .collect();
                variants.push((FileRef::parse(&text).resolved_against(&dir), scope));
            }
        }

        let mut conditions = Vec::new();
        for (file, scope) in variants {
            if !self.fs.exists(file.path()) {
                entry.has_missing_files = true;
                conditions.push(
                    Condition::new(
                        ConditionCode::MissingFile,
                        format!("entry '{}': '{}' does not exist", entry.index, file),
                    )
                    .in_file(path.clone())
                    .for_input(parent)
                    .for_entry(key.clone()),
                );
            }
            if !entry.files.contains(&file) {
                entry.files.push(file.clone());
            }
            entry.file_scopes.insert(file, scope);
        }
        self.conditions.extend(conditions);
    }
}

/// Text of a GIS or grid reference, completing bare layer names.
pub(crate) fn reference_text(
    kind: InputKind,
    text: &str,
    part: PartKind,
    config: &ModelConfig,
) -> String {
    let bare = part == PartKind::Text && Path::new(text).extension().is_none();
    if !bare {
        return text.to_string();
    }
    match kind {
        InputKind::Gis => match (&config.spatial_database, config.gis_format) {
            (Some(database), _) => format!("{} >> {text}", database.display()),
            (None, GisFormat::Gpkg) => format!("{text}.gpkg >> {text}"),
            (None, format) => format!("{text}.{}", format.extension()),
        },
        InputKind::Grid => {
            let ext = config
                .grid_format
                .as_deref()
                .unwrap_or(DEFAULT_GRID_EXTENSION)
                .to_ascii_lowercase();
            format!("{text}.{ext}")
        }
        _ => text.to_string(),
    }
}

fn is_resolution_code(code: ConditionCode) -> bool {
    matches!(
        code,
        ConditionCode::MissingFile
            | ConditionCode::NoWildcardMatch
            | ConditionCode::MissingLayer
            | ConditionCode::UnresolvedScope
            | ConditionCode::BinaryDatabase
    )
}

/// Inputs whose files change with the configuration.
fn depends_on_config(input: &Input) -> bool {
    matches!(input.kind, InputKind::Gis | InputKind::Grid | InputKind::File)
        && input
            .command
            .rhs_parts()
            .iter()
            .any(|p| p.kind == PartKind::Text || tuflow_syntax::has_placeholders(&p.text))
}

/// Folds one input into the model configuration.
fn absorb_config(config: &mut ModelConfig, input: &Input, dir: &Path) {
    match input.command.block() {
        Some(BlockToken::If { kind, names } | BlockToken::ElseIf { kind, names }) => {
            for name in names.split('|') {
                match kind {
                    ScopeKind::Scenario => config.add_scenario(name),
                    ScopeKind::Event => config.add_event(name),
                    _ => {}
                }
            }
            return;
        }
        Some(BlockToken::Define {
            kind: ScopeKind::EventDefine,
            name,
        }) => {
            for name in name.split('|') {
                config.add_event(name);
            }
            return;
        }
        Some(_) => return,
        None => {}
    }
    match input.kind {
        InputKind::Variable => {
            if let Some(name) = input.command.variable_name() {
                config.add_variable(&name, &input.value());
            }
        }
        InputKind::Event => {
            let Some((token, value)) = input.command.event_source() else {
                return;
            };
            for scope in input.scope.iter() {
                if scope.kind == ScopeKind::EventDefine && scope.known {
                    for event in &scope.names {
                        config.event_database.insert(event, &token, &value);
                    }
                }
            }
        }
        InputKind::Comment | InputKind::Blank | InputKind::Block | InputKind::Unparsed => {}
        _ => match input.key().as_str() {
            "SPATIAL DATABASE" => {
                let value = input.value();
                match value.trim().to_ascii_uppercase().as_str() {
                    "OFF" | "NONE" => config.spatial_database = None,
                    "TCF" | "" => {}
                    _ => {
                        let reference = FileRef::parse(&value).resolved_against(dir);
                        config.spatial_database = Some(reference.path().to_path_buf());
                    }
                }
            }
            "GIS FORMAT" => {
                if let Some(format) = GisFormat::parse(&input.value()) {
                    config.gis_format = format;
                }
            }
            "GRID FORMAT" => {
                let value = input.value();
                let value = value.trim();
                if !value.is_empty() {
                    config.grid_format = Some(SmolStr::new(value.to_ascii_lowercase()));
                }
            }
            "MODEL SCENARIOS" => {
                for name in input.value().split('|') {
                    config.add_scenario(name);
                }
            }
            "MODEL EVENTS" => {
                for name in input.value().split('|') {
                    config.add_event(name);
                }
            }
            _ => {}
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::InputQuery;
    use crate::services::MemoryFileSystem;

    fn load(fs: MemoryFileSystem) -> Model {
        Model::load("/m/model.tcf", fs, FileGis).unwrap()
    }

    #[test]
    fn test_root_not_found() {
        let err = Model::load("/m/none.tcf", MemoryFileSystem::new(), FileGis).unwrap_err();
        assert!(matches!(err, ModelError::RootNotFound(_)));
    }

    #[test]
    fn test_missing_child_is_a_condition() {
        let fs = MemoryFileSystem::new().with_file(
            "/m/model.tcf",
            "Geometry Control File == geom.tgc\nRead GIS Z Shape == gis\\2d_zsh_R.shp\n",
        );
        let model = load(fs);
        let cfs = model.control_files();
        assert_eq!(cfs.len(), 2);
        assert_eq!(model.control_file(cfs[1]).unwrap().state(), LoadState::NotFound);
        let codes: Vec<&str> = model.conditions().iter().map(|c| c.code.code()).collect();
        assert_eq!(codes, ["C001", "C001"]);
        let gis = model
            .find_input(&InputQuery::new().kind(InputKind::Gis))
            .unwrap();
        assert!(model.input(gis).unwrap().has_missing_files());
    }

    #[test]
    fn test_children_load_depth_first() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "Geometry Control File == ..\\m\\geom.tgc\n")
            .with_file("/m/geom.tgc", "Read GIS Z Shape == gis/2d_zsh_R.shp\n")
            .with_file("/m/gis/2d_zsh_R.shp", "");
        let model = load(fs);
        let cfs = model.control_files();
        assert_eq!(cfs.len(), 2);
        let child = model.control_file(cfs[1]).unwrap();
        assert_eq!(child.path(), Path::new("/m/geom.tgc"));
        assert_eq!(child.state(), LoadState::Loaded);
        assert!(model.conditions().is_empty());
    }

    #[test]
    fn test_read_file_inlined_with_provenance() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "Read File == common.trd\nTimestep == 2\n")
            .with_file("/m/common.trd", "If Scenario == D01\nCell Size == 5\nEnd If\n");
        let model = load(fs);
        let inputs = model.inputs(ControlFileId::ROOT).unwrap();
        assert_eq!(inputs.len(), 5);
        assert_eq!(inputs[0].kind(), InputKind::ReadFile);
        assert_eq!(inputs[2].trd_source(), Some(Path::new("/m/common.trd")));
        assert_eq!(inputs[2].scope().to_string(), "Scenario == D01");
        assert!(inputs[4].trd_source().is_none());
        assert!(inputs[4].scope().is_global());
        assert_eq!(model.config().scenarios, ["D01"]);
    }

    #[test]
    fn test_nested_read_file_is_fatal() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "Read File == a.trd\n")
            .with_file("/m/a.trd", "Read File == b.trd\n");
        let err = Model::load("/m/model.tcf", fs, FileGis).unwrap_err();
        assert!(matches!(err, ModelError::NestedReadFile { .. }));
    }

    #[test]
    fn test_wildcard_children_get_file_scopes() {
        let fs = MemoryFileSystem::new()
            .with_file(
                "/m/model.tcf",
                "Model Scenarios == D01 | D02\nGeometry Control File == geom_<<~s1~>>.tgc\n",
            )
            .with_file("/m/geom_D01.tgc", "Cell Size == 1\n")
            .with_file("/m/geom_D02.tgc", "Cell Size == 2\n");
        let model = load(fs);
        let input = model
            .find_input(&InputQuery::new().kind(InputKind::ControlFile))
            .unwrap();
        let input = model.input(input).unwrap();
        assert_eq!(input.children().len(), 2);
        let scopes: Vec<String> = input.file_scopes().values().map(ToString::to_string).collect();
        assert_eq!(scopes, ["Scenario == D01", "Scenario == D02"]);
    }

    #[test]
    fn test_bare_layer_names_use_spatial_database() {
        let fs = MemoryFileSystem::new()
            .with_file(
                "/m/model.tcf",
                "Spatial Database == gis/model.gpkg\nRead GIS Z Shape == 2d_zsh_R | 2d_zsh_L\n",
            )
            .with_file("/m/gis/model.gpkg", "");
        let model = load(fs);
        let gis = model
            .find_input(&InputQuery::new().kind(InputKind::Gis))
            .unwrap();
        let files: Vec<String> = model
            .input(gis)
            .unwrap()
            .files()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(files, ["/m/gis/model.gpkg >> 2d_zsh_R", "/m/gis/model.gpkg >> 2d_zsh_L"]);
    }

    #[test]
    fn test_event_database_and_entries() {
        let fs = MemoryFileSystem::new()
            .with_file(
                "/m/model.tcf",
                "Event File == events.tef\nBC Database == bc_dbase.csv\n",
            )
            .with_file(
                "/m/events.tef",
                "Define Event == Q100\nBC Event Source == ~ARI~ | 100y\nEnd Define\n\
                 Define Event == Q010\nBC Event Source == ~ARI~ | 10y\nEnd Define\n",
            )
            .with_file(
                "/m/bc_dbase.csv",
                "Name,Source,Time,Value\nFC01,flow_~ARI~.csv,Time,Q\nDS,\"1,0.02,2,0.04\",,\n",
            )
            .with_file("/m/flow_100y.csv", "");
        let model = load(fs);
        assert_eq!(model.config().events, ["Q100", "Q010"]);
        let db = model.databases()[0];
        let db = model.database(db).unwrap();
        let entry = db.entry("fc01").unwrap();
        assert_eq!(entry.files().len(), 2);
        assert!(entry.has_missing_files());
        let scopes: Vec<String> = entry.file_scopes().values().map(ToString::to_string).collect();
        assert_eq!(scopes, ["Event == Q100", "Event == Q010"]);
        assert!(db.entry("DS").unwrap().is_list());
        assert!(db.entry("DS").unwrap().files().is_empty());
    }

    #[test]
    fn test_block_issues_become_conditions() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "End If\nIf Scenario == A\nCell Size == 1\n");
        let model = load(fs);
        let codes: Vec<&str> = model.conditions().iter().map(|c| c.code.code()).collect();
        assert_eq!(codes, ["W002", "W004"]);
    }
}
