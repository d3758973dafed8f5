//! File references written in control-file values.
//!
//! A value can name a plain file (`..\model\gis\2d_zsh.shp`) or a layer
//! inside a spatial database, either GeoPackage style
//! (`db.gpkg >> 2d_code_R`) or OGR style (`db.gpkg|layername=2d_code_R`).

use std::fmt;
use std::path::{Component, Path, PathBuf};

use smol_str::SmolStr;

use crate::lexer::{lex, TokenKind};

/// A reference to a file or to a layer inside a database file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileRef {
    /// A plain file.
    Path(PathBuf),
    /// A layer stored in a spatial database.
    Layer {
        /// The database file.
        database: PathBuf,
        /// Layer name inside the database.
        layer: SmolStr,
    },
}

impl FileRef {
    /// Parses reference text as written in a control file.
    ///
    /// Backslashes are treated as path separators and surrounding quotes are
    /// removed. The result is not yet anchored to any directory.
    #[must_use]
    pub fn parse(text: &str) -> FileRef {
        let text = unquote(text.trim());
        if let Some(sep) = lex(text).into_iter().find(|t| t.kind == TokenKind::LayerSep) {
            return FileRef::Layer {
                database: to_path(text[..sep.start()].trim()),
                layer: SmolStr::new(unquote(text[sep.end()..].trim())),
            };
        }
        if let Some(pos) = text.to_ascii_lowercase().find("|layername=") {
            let layer = &text[pos + "|layername=".len()..];
            return FileRef::Layer {
                database: to_path(text[..pos].trim()),
                layer: SmolStr::new(layer.trim()),
            };
        }
        FileRef::Path(to_path(text))
    }

    /// A layer in `database`.
    #[must_use]
    pub fn layer(database: impl Into<PathBuf>, layer: impl Into<SmolStr>) -> FileRef {
        FileRef::Layer {
            database: database.into(),
            layer: layer.into(),
        }
    }

    /// The file on disk: the path itself or the layer's database.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            FileRef::Path(path) => path,
            FileRef::Layer { database, .. } => database,
        }
    }

    /// The layer name, for database references.
    #[must_use]
    pub fn layer_name(&self) -> Option<&str> {
        match self {
            FileRef::Path(_) => None,
            FileRef::Layer { layer, .. } => Some(layer),
        }
    }

    /// Anchors a relative reference at `dir` and normalizes `.`/`..`.
    #[must_use]
    pub fn resolved_against(&self, dir: &Path) -> FileRef {
        let anchor = |p: &Path| {
            if p.is_absolute() {
                normalize_lexically(p)
            } else {
                normalize_lexically(&dir.join(p))
            }
        };
        match self {
            FileRef::Path(path) => FileRef::Path(anchor(path)),
            FileRef::Layer { database, layer } => FileRef::Layer {
                database: anchor(database),
                layer: layer.clone(),
            },
        }
    }

    /// The same reference pointing at another file.
    #[must_use]
    pub fn with_path(&self, path: PathBuf) -> FileRef {
        match self {
            FileRef::Path(_) => FileRef::Path(path),
            FileRef::Layer { layer, .. } => FileRef::Layer {
                database: path,
                layer: layer.clone(),
            },
        }
    }

    /// Lower-case extension of the referenced file, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.path()
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileRef::Path(path) => write!(f, "{}", path.display()),
            FileRef::Layer { database, layer } => {
                write!(f, "{} >> {layer}", database.display())
            }
        }
    }
}

/// Converts control-file path text to a `PathBuf`.
#[must_use]
pub fn to_path(text: &str) -> PathBuf {
    PathBuf::from(unquote(text.trim()).replace('\\', "/"))
}

/// Removes one pair of surrounding double quotes.
#[must_use]
pub fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

/// Resolves `.` and `..` components without touching the file system.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            _ => normalized.push(component.as_os_str()),
        }
    }
    normalized
}
