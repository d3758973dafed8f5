//! Collaborator services the model calls into.
//!
//! The model never touches the disk or a GIS driver directly. Hosts pass a
//! [`FileSystem`] and a [`GisService`]; [`StdFileSystem`] and [`FileGis`]
//! are the defaults, [`MemoryFileSystem`] keeps everything in memory.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glob::{MatchOptions, Pattern};
use smol_str::SmolStr;
use tracing::debug;
use tuflow_syntax::FileRef;

/// File access used for loading and writing control files.
pub trait FileSystem {
    /// Returns `true` if `path` names an existing file.
    fn exists(&self, path: &Path) -> bool;

    /// Reads the raw bytes of a file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Reads a UTF-8 text file.
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    /// Replaces the contents of `path`. Either the whole file is written or
    /// nothing is.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Expands a glob pattern (`*`, `?`, `**`) to existing files.
    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>>;
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn pattern_error(err: glob::PatternError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
}

/// The local file system.
///
/// Globbing ignores case, since control files are routinely authored on
/// case-insensitive file systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl StdFileSystem {
    /// Creates the service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = path.with_file_name(format!(".{file_name}.tmp"));
        std::fs::write(&temp, contents)?;
        if let Err(err) = std::fs::rename(&temp, path) {
            let _ = std::fs::remove_file(&temp);
            return Err(err);
        }
        Ok(())
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let paths = glob::glob_with(pattern, match_options()).map_err(pattern_error)?;
        let mut out = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => out.push(path),
                Ok(_) => {}
                Err(err) => debug!("skipping unreadable glob entry: {err}"),
            }
        }
        out.sort();
        Ok(out)
    }
}

/// An in-memory file system.
///
/// Clones share the same storage, so a test can keep a handle and inspect
/// what the model wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Rc<RefCell<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MemoryFileSystem {
    /// Creates an empty file system.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file and returns the file system (builder style).
    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Adds or replaces a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.borrow_mut().insert(path.into(), contents.into());
    }

    /// Removes a file.
    pub fn remove(&self, path: &Path) -> bool {
        self.files.borrow_mut().remove(path).is_some()
    }

    /// Text of a stored file.
    #[must_use]
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .borrow()
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Every stored path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.borrow().keys().cloned().collect()
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.borrow().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        self.insert(path, contents.as_bytes());
        Ok(())
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let pattern = Pattern::new(pattern).map_err(pattern_error)?;
        let options = match_options();
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|path| pattern.matches_path_with(path, options))
            .cloned()
            .collect())
    }
}

/// Geometry of a vector layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    /// Point features.
    Point,
    /// Line features.
    Line,
    /// Polygon features.
    Region,
}

/// GIS layer queries.
///
/// Every method has a conservative default so a host only overrides what its
/// driver supports. `None` means "cannot tell" and is never reported as a
/// missing layer.
pub trait GisService {
    /// Layer names in a spatial database.
    fn list_layers(&self, _database: &Path) -> Option<Vec<SmolStr>> {
        None
    }

    /// Geometry of a layer.
    fn geometry_type(&self, _reference: &FileRef) -> Option<GeometryType> {
        None
    }

    /// File names stored in a layer's attributes (table links, cross
    /// sections), as written, relative to the layer's directory.
    fn attribute_files(&self, _reference: &FileRef) -> Vec<String> {
        Vec::new()
    }

    /// Whether a layer is present in its database.
    fn layer_exists(&self, reference: &FileRef) -> Option<bool> {
        match reference {
            FileRef::Path(_) => None,
            FileRef::Layer { database, layer } => self
                .list_layers(database)
                .map(|layers| layers.iter().any(|l| l.eq_ignore_ascii_case(layer))),
        }
    }
}

/// GIS service without a driver.
///
/// Geometry is inferred from the `_P`/`_L`/`_R` layer naming convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileGis;

impl GisService for FileGis {
    fn geometry_type(&self, reference: &FileRef) -> Option<GeometryType> {
        let name = match reference {
            FileRef::Path(path) => path.file_stem()?.to_string_lossy().into_owned(),
            FileRef::Layer { layer, .. } => layer.to_string(),
        };
        let (_, suffix) = name.rsplit_once('_')?;
        match suffix.to_ascii_uppercase().as_str() {
            "P" | "PTS" => Some(GeometryType::Point),
            "L" | "LN" => Some(GeometryType::Line),
            "R" | "POLY" => Some(GeometryType::Region),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_glob_ignores_case() {
        let fs = MemoryFileSystem::new()
            .with_file("/m/gis/2d_zsh_D01_R.shp", "")
            .with_file("/m/gis/2d_zsh_EXG_R.shp", "")
            .with_file("/m/gis/sub/2d_zsh_X_R.shp", "");
        let found = fs.glob("/m/GIS/2d_zsh_*_R.shp").unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_memory_clones_share_storage() {
        let fs = MemoryFileSystem::new();
        let handle = fs.clone();
        fs.write(Path::new("/out.tcf"), "Cell Size == 5\n").unwrap();
        assert_eq!(handle.contents("/out.tcf").as_deref(), Some("Cell Size == 5\n"));
        assert!(fs.read(Path::new("/missing")).is_err());
    }

    #[test]
    fn test_std_write_is_atomic_replace() {
        let dir = std::env::temp_dir().join(format!("tuflow-fs-{}", std::process::id()));
        let path = dir.join("model.tcf");
        let fs = StdFileSystem::new();
        fs.write(&path, "a\n").unwrap();
        fs.write(&path, "b\n").unwrap();
        assert_eq!(fs.read_to_string(&path).unwrap(), "b\n");
        assert!(!dir.join(".model.tcf.tmp").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_geometry_from_name() {
        let gis = FileGis;
        assert_eq!(
            gis.geometry_type(&FileRef::parse("2d_zsh_D01_R.shp")),
            Some(GeometryType::Region)
        );
        assert_eq!(
            gis.geometry_type(&FileRef::parse("db.gpkg >> 2d_bc_L")),
            Some(GeometryType::Line)
        );
        assert_eq!(gis.layer_exists(&FileRef::parse("db.gpkg >> x")), None);
    }
}
