//! Writing the model back to disk.
//!
//! Files are written children first so a parent always refers to the final
//! name of each child. Each file is rendered completely before it is
//! written, and [`FileSystem::write`](crate::services::FileSystem::write)
//! replaces it atomically, so a failed write leaves that file and the
//! model's record of its path untouched. Children written before the
//! failure keep their new content.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::control_file::LoadState;
use crate::error::{ModelError, Result};
use crate::ids::{ChildRef, ControlFileId, DatabaseId, InputId};
use crate::model::Model;

/// Upper bound on version bumps while looking for a free file name.
const MAX_INCREMENT_ATTEMPTS: usize = 1000;

/// How written files are named.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Bump the trailing version number (`M01_003` -> `M01_004`), or append
    /// one when the name has none.
    #[default]
    AutoIncrement,
    /// Append `_<suffix>` to the file stem unless it is already there.
    Suffix(String),
    /// Overwrite edited files.
    InPlace,
    /// Rewrite every loaded file at its current path, edited or not.
    NoRename,
}

impl WritePolicy {
    fn renames(&self) -> bool {
        matches!(self, Self::AutoIncrement | Self::Suffix(_))
    }
}

/// Files written by one call to [`Model::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Paths written, in write order.
    pub written: Vec<PathBuf>,
}

impl Model {
    /// Text a control file would be written as.
    ///
    /// Lines that came from a `Read File` fragment are left out; the
    /// fragment marker stands in for them.
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownControlFile`] for foreign ids.
    pub fn preview(&self, cf: ControlFileId) -> Result<String> {
        let file = self.control_file(cf)?;
        Ok(render_lines(
            file.inputs
                .iter()
                .filter_map(|id| self.inputs.get(id))
                .filter(|input| input.trd_source.is_none())
                .map(|input| input.command.raw()),
            file.line_ending,
        ))
    }

    /// Text of one `Read File` fragment.
    fn render_fragment(&self, cf: ControlFileId, fragment: &Path) -> Result<String> {
        let file = self.control_file(cf)?;
        Ok(render_lines(
            file.inputs
                .iter()
                .filter_map(|id| self.inputs.get(id))
                .filter(|input| input.trd_source.as_deref() == Some(fragment))
                .map(|input| input.command.raw()),
            file.line_ending,
        ))
    }

    /// Writes with the policy from the settings.
    ///
    /// # Errors
    /// See [`Model::write`].
    pub fn save(&mut self) -> Result<WriteSummary> {
        let policy = self.settings.write_policy.clone();
        self.write(&policy)
    }

    /// Writes every edited file according to `policy`.
    ///
    /// A successful write seals the change log: [`Model::reset`] stops at
    /// this point while [`Model::undo`] can still step past it.
    ///
    /// # Errors
    /// Returns [`ModelError::Io`] for the first file that cannot be written.
    /// Files written before the failure keep their new names.
    pub fn write(&mut self, policy: &WritePolicy) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        self.write_control_file(ControlFileId::ROOT, policy, &mut summary)?;
        self.changes.seal();
        info!("wrote {} files", summary.written.len());
        Ok(summary)
    }

    fn write_control_file(
        &mut self,
        cf: ControlFileId,
        policy: &WritePolicy,
        summary: &mut WriteSummary,
    ) -> Result<Option<PathBuf>> {
        let ids = self.control_file(cf)?.inputs.clone();
        for id in ids {
            let Some(input) = self.inputs.get(&id) else {
                continue;
            };
            let children = input.children.clone();
            let child_policy = if self.wildcards.is_wild(input.command.rhs()) {
                WritePolicy::InPlace
            } else {
                policy.clone()
            };
            for child in children {
                let renamed = match child {
                    ChildRef::ControlFile(child) => {
                        let old = self.control_file(child)?.path.clone();
                        self.write_control_file(child, &child_policy, summary)?
                            .map(|new| (old, new))
                    }
                    ChildRef::Database(db) => {
                        let old = self.database(db)?.path.clone();
                        self.write_database(db, &child_policy, summary)?
                            .map(|new| (old, new))
                    }
                };
                if let Some((old, new)) = renamed {
                    self.rename_reference(id, &old, &new)?;
                }
            }
        }

        self.write_fragments(cf, policy, summary)?;

        let file = self.control_file(cf)?;
        let write = match file.state {
            LoadState::Loaded => file.dirty || *policy == WritePolicy::NoRename,
            _ => file.dirty,
        };
        if !write {
            return Ok(None);
        }
        let old = file.path.clone();
        let target = self.target_path(&old, policy);
        let text = self.preview(cf)?;
        self.fs
            .write(&target, &text)
            .map_err(|err| ModelError::io(&target, err))?;
        debug!("wrote {}", target.display());
        summary.written.push(target.clone());

        let file = self.control_file_mut(cf)?;
        file.path.clone_from(&target);
        file.dirty = false;
        file.state = LoadState::Loaded;
        let ids = file.inputs.clone();
        for id in ids {
            if let Some(input) = self.inputs.get_mut(&id) {
                input.dirty = false;
            }
        }
        Ok((target != old).then_some(target))
    }

    fn write_fragments(
        &mut self,
        cf: ControlFileId,
        policy: &WritePolicy,
        summary: &mut WriteSummary,
    ) -> Result<()> {
        let fragments: Vec<(PathBuf, bool)> = self
            .control_file(cf)?
            .fragments
            .iter()
            .map(|(path, state)| (path.clone(), state.dirty || !state.exists))
            .collect();
        for (fragment, pending) in fragments {
            if !pending && *policy != WritePolicy::NoRename {
                continue;
            }
            let target = self.target_path(&fragment, policy);
            let text = self.render_fragment(cf, &fragment)?;
            self.fs
                .write(&target, &text)
                .map_err(|err| ModelError::io(&target, err))?;
            debug!("wrote fragment {}", target.display());
            summary.written.push(target.clone());

            let file = self.control_file_mut(cf)?;
            file.fragments.shift_remove(&fragment);
            let entry = file.fragments.entry(target.clone()).or_default();
            entry.exists = true;
            entry.dirty = false;
            let ids = file.inputs.clone();
            let mut marker = None;
            for id in ids {
                let Some(input) = self.inputs.get_mut(&id) else {
                    continue;
                };
                if input.trd_source.as_deref() == Some(fragment.as_path()) {
                    input.trd_source = Some(target.clone());
                    input.dirty = false;
                } else if input.files.first().map(|f| f.path()) == Some(fragment.as_path()) {
                    marker = Some(id);
                }
            }
            if target != fragment {
                if let Some(marker) = marker {
                    self.rename_reference(marker, &fragment, &target)?;
                }
            }
        }
        Ok(())
    }

    fn write_database(
        &mut self,
        db: DatabaseId,
        policy: &WritePolicy,
        summary: &mut WriteSummary,
    ) -> Result<Option<PathBuf>> {
        let database = self.database(db)?;
        let write = database.state == LoadState::Loaded
            && (database.dirty || *policy == WritePolicy::NoRename);
        if !write {
            return Ok(None);
        }
        let old = database.path.clone();
        let line_ending = self
            .inputs
            .get(&database.parent)
            .and_then(|input| self.control_files.get(input.parent.0 as usize))
            .map_or("\n", |cf| cf.line_ending);
        let text = database.render(line_ending);
        let target = self.target_path(&old, policy);
        self.fs
            .write(&target, &text)
            .map_err(|err| ModelError::io(&target, err))?;
        debug!("wrote database {}", target.display());
        summary.written.push(target.clone());

        let database = self.database_mut(db)?;
        database.path.clone_from(&target);
        database.dirty = false;
        Ok((target != old).then_some(target))
    }

    /// Points an input at a renamed file and marks its control file for
    /// writing.
    fn rename_reference(&mut self, id: InputId, old: &Path, new: &Path) -> Result<()> {
        let input = self.input_mut(id)?;
        if let Some(rhs) = replace_file_name(input.command.rhs(), old, new) {
            input.command.set_rhs(&rhs);
        }
        for file in &mut input.files {
            if file.path() == old {
                *file = file.with_path(new.to_path_buf());
            }
        }
        let cf = input.parent;
        input.dirty = true;
        self.mark_dirty(cf);
        Ok(())
    }

    /// Where a file is written under `policy`.
    fn target_path(&self, path: &Path, policy: &WritePolicy) -> PathBuf {
        if !policy.renames() {
            return path.to_path_buf();
        }
        let mut candidate = next_name(path, policy, self.settings.increment_width);
        if let WritePolicy::AutoIncrement = policy {
            for _ in 0..MAX_INCREMENT_ATTEMPTS {
                if !self.fs.exists(&candidate) {
                    break;
                }
                candidate = next_name(&candidate, policy, self.settings.increment_width);
            }
        }
        candidate
    }
}

fn render_lines<'a>(lines: impl Iterator<Item = &'a str>, line_ending: &str) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push_str(line_ending);
    }
    out
}

/// The next name of a file under a renaming policy.
pub(crate) fn next_name(path: &Path, policy: &WritePolicy, width: usize) -> PathBuf {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return path.to_path_buf();
    };
    let stem = match policy {
        WritePolicy::AutoIncrement => increment(&stem, width),
        WritePolicy::Suffix(suffix) => {
            let tail = format!("_{suffix}");
            if stem.to_ascii_lowercase().ends_with(&tail.to_ascii_lowercase()) {
                stem
            } else {
                format!("{stem}{tail}")
            }
        }
        WritePolicy::InPlace | WritePolicy::NoRename => stem,
    };
    match path.extension() {
        Some(ext) => path.with_file_name(format!("{stem}.{}", ext.to_string_lossy())),
        None => path.with_file_name(stem),
    }
}

fn increment(stem: &str, width: usize) -> String {
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return format!("{stem}_{:0width$}", 1);
    }
    let (head, number) = stem.split_at(stem.len() - digits);
    let next = number.parse::<u64>().map_or(1, |n| n + 1);
    format!("{head}{next:0digits$}")
}

/// Replaces the last case-insensitive occurrence of `old`'s file name in
/// `rhs` with `new`'s.
fn replace_file_name(rhs: &str, old: &Path, new: &Path) -> Option<String> {
    let old_name = old.file_name()?.to_string_lossy();
    let new_name = new.file_name()?.to_string_lossy();
    let pos = rhs
        .to_ascii_lowercase()
        .rfind(&old_name.to_ascii_lowercase())?;
    Some(format!(
        "{}{new_name}{}",
        &rhs[..pos],
        &rhs[pos + old_name.len()..]
    ))
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::input::{InputKind, Position};
    use crate::query::InputQuery;
    use crate::services::{FileGis, MemoryFileSystem};

    fn name(path: &str, policy: &WritePolicy) -> String {
        next_name(Path::new(path), policy, 3)
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_next_names() {
        assert_eq!(name("/m/M01_005.tcf", &WritePolicy::AutoIncrement), "/m/M01_006.tcf");
        assert_eq!(name("/m/M01_099.tcf", &WritePolicy::AutoIncrement), "/m/M01_100.tcf");
        assert_eq!(name("/m/model.tgc", &WritePolicy::AutoIncrement), "/m/model_001.tgc");
        let suffix = WritePolicy::Suffix("edit".into());
        assert_eq!(name("/m/model.tgc", &suffix), "/m/model_edit.tgc");
        assert_eq!(name("/m/model_EDIT.tgc", &suffix), "/m/model_EDIT.tgc");
        assert_eq!(name("/m/model.tgc", &WritePolicy::InPlace), "/m/model.tgc");
    }

    #[test]
    fn test_replace_file_name_keeps_directory_text() {
        let out = replace_file_name(
            "..\\model\\Geom_001.TGC ! main",
            Path::new("/m/geom_001.tgc"),
            Path::new("/m/geom_002.tgc"),
        );
        assert_eq!(out.as_deref(), Some("..\\model\\geom_002.tgc ! main"));
    }

    #[test]
    fn test_renamed_child_updates_parent() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/M01_001.tcf", "Geometry Control File == geom_001.tgc\n")
            .with_file("/m/geom_001.tgc", "Cell Size == 5\n");
        let mut model = Model::load("/m/M01_001.tcf", fs.clone(), FileGis).unwrap();
        let cell = model
            .find_input(&InputQuery::new().lhs("cell size"))
            .unwrap();
        model.set_rhs(cell, "2").unwrap();
        let summary = model.write(&WritePolicy::AutoIncrement).unwrap();
        assert_eq!(
            summary.written,
            [PathBuf::from("/m/geom_002.tgc"), PathBuf::from("/m/M01_002.tcf")]
        );
        expect![[r#"
            Geometry Control File == geom_002.tgc
        "#]]
        .assert_eq(&fs.contents("/m/M01_002.tcf").unwrap());
        assert_eq!(fs.contents("/m/geom_002.tgc").as_deref(), Some("Cell Size == 2\n"));
        assert_eq!(fs.contents("/m/geom_001.tgc").as_deref(), Some("Cell Size == 5\n"));
        assert!(!model.is_dirty());
    }

    #[test]
    fn test_dirty_fragment_is_written_separately() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "Read File == common.trd\nTimestep == 2\n")
            .with_file("/m/common.trd", "Cell Size == 5\n");
        let mut model = Model::load("/m/model.tcf", fs.clone(), FileGis).unwrap();
        let cell = model
            .find_input(&InputQuery::new().lhs("cell size"))
            .unwrap();
        model.set_rhs(cell, "10").unwrap();
        model
            .insert_input(cell, "Map Output Interval == 300", Position::After, 0)
            .unwrap();
        model.write(&WritePolicy::Suffix("v2".into())).unwrap();
        assert_eq!(
            fs.contents("/m/common_v2.trd").as_deref(),
            Some("Cell Size == 10\nMap Output Interval == 300\n")
        );
        assert_eq!(
            fs.contents("/m/model_v2.tcf").as_deref(),
            Some("Read File == common_v2.trd\nTimestep == 2\n")
        );
        let marker = model
            .find_input(&InputQuery::new().kind(InputKind::ReadFile))
            .unwrap();
        assert_eq!(model.input(marker).unwrap().rhs(), "common_v2.trd");
    }

    #[test]
    fn test_in_place_keeps_clean_files_untouched() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/model.tcf", "Geometry Control File == geom.tgc\r\nTimestep == 2\r\n")
            .with_file("/m/geom.tgc", "Cell Size == 5\n");
        let mut model = Model::load("/m/model.tcf", fs.clone(), FileGis).unwrap();
        let step = model.find_input(&InputQuery::new().lhs("timestep")).unwrap();
        model.set_rhs(step, "1").unwrap();
        let summary = model.write(&WritePolicy::InPlace).unwrap();
        assert_eq!(summary.written, [PathBuf::from("/m/model.tcf")]);
        assert_eq!(
            fs.contents("/m/model.tcf").as_deref(),
            Some("Geometry Control File == geom.tgc\r\nTimestep == 1\r\n")
        );
        let all = model.write(&WritePolicy::NoRename).unwrap();
        assert_eq!(all.written.len(), 2);
    }

}
