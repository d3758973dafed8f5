//! Model configuration.
//!
//! [`ModelConfig`] is the snapshot of model-wide settings gathered from the
//! loaded control files (variables, spatial database, scenario and event
//! names, event sources). It is owned once by the [`Model`](crate::Model)
//! and rebuilt by [`Model::propagate_config`](crate::Model::propagate_config).
//!
//! [`ModelSettings`] are host preferences read from `tuflow-model.toml`.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use smol_str::SmolStr;
use tracing::warn;
use tuflow_syntax::expand::DEFAULT_WILDCARDS;

use crate::database::EventDatabase;
use crate::error::{ModelError, Result};
use crate::services::FileSystem;
use crate::writer::WritePolicy;

/// Settings file looked up next to the root control file.
pub const SETTINGS_FILE: &str = "tuflow-model.toml";

/// Host preferences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ModelSettings {
    /// Regex patterns replaced by `*` when globbing wildcard references.
    pub wildcards: Vec<String>,
    /// Policy used by [`Model::save`](crate::Model::save).
    pub write_policy: WritePolicy,
    /// Digits used when auto-increment appends a new version number.
    pub increment_width: usize,
    /// Parse database files (bc_dbase, materials) referenced by inputs.
    pub load_databases: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            wildcards: DEFAULT_WILDCARDS.iter().map(|p| (*p).to_string()).collect(),
            write_policy: WritePolicy::AutoIncrement,
            increment_width: 3,
            load_databases: true,
        }
    }
}

impl ModelSettings {
    /// Loads `tuflow-model.toml` from `dir`, falling back to defaults.
    pub fn load(fs: &dyn FileSystem, dir: &Path) -> Self {
        let path = dir.join(SETTINGS_FILE);
        if !fs.exists(&path) {
            return Self::default();
        }
        let Ok(contents) = fs.read_to_string(&path) else {
            warn!("Failed to read settings at {}", path.display());
            return Self::default();
        };
        match Self::parse(&contents) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("Ignoring settings at {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Parses settings text.
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidSettings`] for malformed TOML, unknown
    /// keys or invalid wildcard patterns.
    pub fn parse(contents: &str) -> Result<Self> {
        let settings: ModelSettings = toml::from_str(contents)
            .map_err(|err| ModelError::InvalidSettings(SmolStr::new(err.to_string().trim())))?;
        if let Some(bad) = settings
            .wildcards
            .iter()
            .find(|p| regex::Regex::new(p).is_err())
        {
            return Err(ModelError::InvalidSettings(SmolStr::new(format!(
                "wildcard pattern '{bad}' is not a valid regex"
            ))));
        }
        Ok(settings)
    }
}

/// Vector format assumed for layer names written without an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GisFormat {
    /// ESRI shapefile.
    #[default]
    Shp,
    /// GeoPackage, one database per layer unless a spatial database is set.
    Gpkg,
    /// MapInfo interchange.
    Mif,
}

impl GisFormat {
    /// Parses the value of `GIS Format == ...`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "SHP" => Some(Self::Shp),
            "GPKG" => Some(Self::Gpkg),
            "MIF" => Some(Self::Mif),
            _ => None,
        }
    }

    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Shp => "shp",
            Self::Gpkg => "gpkg",
            Self::Mif => "mif",
        }
    }
}

/// Model-wide configuration shared by every loaded control file.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    /// Directory of the root control file.
    pub root_dir: PathBuf,
    /// Every value each user variable takes in some branch, keyed by
    /// upper-case name.
    pub variables: IndexMap<SmolStr, Vec<SmolStr>>,
    /// `Spatial Database == ...`, resolved.
    pub spatial_database: Option<PathBuf>,
    /// `GIS Format == ...`.
    pub gis_format: GisFormat,
    /// `Grid Format == ...` extension.
    pub grid_format: Option<SmolStr>,
    /// Scenario names seen in blocks or `Model Scenarios`.
    pub scenarios: Vec<SmolStr>,
    /// Event names seen in blocks or `Model Events`.
    pub events: Vec<SmolStr>,
    /// Event sources from `Define Event` blocks.
    pub event_database: EventDatabase,
}

impl ModelConfig {
    /// A fresh configuration for a model rooted in `root_dir`.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Records a value of a user variable.
    pub fn add_variable(&mut self, name: &str, value: &str) {
        let key = tuflow_syntax::expand::placeholder_key(name);
        let values = self.variables.entry(key).or_default();
        if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
            values.push(SmolStr::new(value));
        }
    }

    /// Records a scenario name.
    pub fn add_scenario(&mut self, name: &str) {
        push_unique(&mut self.scenarios, name);
    }

    /// Records an event name.
    pub fn add_event(&mut self, name: &str) {
        push_unique(&mut self.events, name);
    }

    /// The only value of a variable, when it has exactly one.
    #[must_use]
    pub fn single_value(&self, name: &str) -> Option<&SmolStr> {
        let values = self
            .variables
            .get(&tuflow_syntax::expand::placeholder_key(name))?;
        match values.as_slice() {
            [value] => Some(value),
            _ => None,
        }
    }

    /// Scenario, event and variable names usable when naming unknown scopes.
    #[must_use]
    pub fn scope_candidates(&self) -> Vec<SmolStr> {
        let mut out: Vec<SmolStr> = Vec::new();
        let values = self.variables.values().flatten();
        for name in self.scenarios.iter().chain(&self.events).chain(values) {
            push_unique(&mut out, name);
        }
        out
    }
}

fn push_unique(list: &mut Vec<SmolStr>, name: &str) {
    let name = name.trim();
    if !name.is_empty() && !list.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        list.push(SmolStr::new(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryFileSystem;

    #[test]
    fn test_settings_defaults_when_missing() {
        let fs = MemoryFileSystem::new();
        let settings = ModelSettings::load(&fs, Path::new("/model"));
        assert_eq!(settings, ModelSettings::default());
        assert_eq!(settings.wildcards.len(), 3);
    }

    #[test]
    fn test_settings_from_toml() {
        let settings = ModelSettings::parse(
            r#"
write-policy = { suffix = "check" }
increment-width = 2
wildcards = ['<<~[sS]\d?~>>']
"#,
        )
        .unwrap();
        assert_eq!(settings.write_policy, WritePolicy::Suffix("check".into()));
        assert_eq!(settings.increment_width, 2);
        assert_eq!(settings.wildcards.len(), 1);
        assert!(settings.load_databases);
    }

    #[test]
    fn test_invalid_settings_fall_back() {
        let fs = MemoryFileSystem::new().with_file("/model/tuflow-model.toml", "bogus = 1\n");
        let settings = ModelSettings::load(&fs, Path::new("/model"));
        assert_eq!(settings, ModelSettings::default());
        assert!(matches!(
            ModelSettings::parse("wildcards = ['(']"),
            Err(ModelError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_variable_values_accumulate() {
        let mut config = ModelConfig::new("/model");
        config.add_variable("CELL_SIZE", "5");
        config.add_variable("cell_size", "2.5");
        config.add_variable("Cell_Size", "5");
        assert_eq!(config.variables["CELL_SIZE"].len(), 2);
        assert!(config.single_value("CELL_SIZE").is_none());
        config.add_variable("TS", "1");
        assert_eq!(config.single_value("<<ts>>").map(SmolStr::as_str), Some("1"));
    }
}
