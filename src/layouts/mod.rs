//! Layout descriptor discovery and parsing.

pub mod manifest;

pub use manifest::{LayoutSource, Manifest, ManifestEntry};

use log::{debug, trace};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Layout the keyboard cannot render; never listed or screenshotted
pub const RESERVED_LAYOUT: &str = "terminal";

const DESCRIPTOR_EXTENSION: &str = "json";

/// A layout descriptor file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutFile {
    /// Filename up to the first `.`
    pub id: String,
    pub path: PathBuf,
}

/// The parts of a layout descriptor the tools care about
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutDescriptor {
    pub name: String,
}

#[derive(Debug)]
pub enum LayoutError {
    /// Listing the layouts directory failed
    ReadDir { path: PathBuf, source: io::Error },
    /// Reading a descriptor failed
    Read { path: PathBuf, source: io::Error },
    /// A descriptor is not valid JSON or has no string `name`
    Parse { path: PathBuf, source: serde_json::Error },
    /// Writing the manifest failed
    Write { path: PathBuf, source: io::Error },
    /// Serializing the manifest failed
    Serialize(serde_json::Error),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::ReadDir { path, source } => {
                write!(f, "Failed to list layouts in {}: {}", path.display(), source)
            }
            LayoutError::Read { path, source } => {
                write!(f, "Failed to read layout {}: {}", path.display(), source)
            }
            LayoutError::Parse { path, source } => {
                write!(f, "Failed to parse layout {}: {}", path.display(), source)
            }
            LayoutError::Write { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
            LayoutError::Serialize(e) => write!(f, "Failed to serialize layout info: {}", e),
        }
    }
}

impl std::error::Error for LayoutError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayoutError::ReadDir { source, .. }
            | LayoutError::Read { source, .. }
            | LayoutError::Write { source, .. } => Some(source),
            LayoutError::Parse { source, .. } => Some(source),
            LayoutError::Serialize(source) => Some(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, LayoutError>;

/// Layout id of a descriptor path, `None` for hidden or non-descriptor files
fn layout_id(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(DESCRIPTOR_EXTENSION) {
        return None;
    }
    let file_name = path.file_name()?.to_str()?;
    if file_name.starts_with('.') {
        return None;
    }
    file_name.split('.').next().map(str::to_string)
}

/// List the layout descriptors in `dir`, sorted by filename.
///
/// The reserved layout is left out.
pub fn discover(dir: &Path) -> Result<Vec<LayoutFile>> {
    let read_dir_err = |source| LayoutError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let path = entry.map_err(read_dir_err)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut layouts = Vec::new();
    for path in paths {
        let Some(id) = layout_id(&path) else {
            trace!("Ignoring {}", path.display());
            continue;
        };
        if id == RESERVED_LAYOUT {
            debug!("Skipping reserved layout '{}'", id);
            continue;
        }
        layouts.push(LayoutFile { id, path });
    }

    debug!("Found {} layouts in {}", layouts.len(), dir.display());
    Ok(layouts)
}

impl LayoutFile {
    /// Parse the descriptor
    pub fn load(&self) -> Result<LayoutDescriptor> {
        let content = fs::read(&self.path).map_err(|source| LayoutError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&content).map_err(|source| LayoutError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_id_stops_at_first_dot() {
        assert_eq!(layout_id(Path::new("/x/de.json")).as_deref(), Some("de"));
        assert_eq!(layout_id(Path::new("/x/us.intl.json")).as_deref(), Some("us"));
        assert_eq!(layout_id(Path::new("/x/README.md")), None);
        assert_eq!(layout_id(Path::new("/x/.hidden.json")), None);
    }

    #[test]
    fn discover_sorts_and_skips_reserved() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["terminal.json", "us.json", "de.json", "notes.txt", "ara.json"] {
            fs::write(dir.path().join(name), r#"{"name":"x"}"#).unwrap();
        }
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        let ids: Vec<_> = discover(dir.path())
            .unwrap()
            .into_iter()
            .map(|layout| layout.id)
            .collect();
        assert_eq!(ids, ["ara", "de", "us"]);
    }

    #[test]
    fn discover_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, LayoutError::ReadDir { .. }));
    }

    #[test]
    fn load_requires_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.json");
        fs::write(&path, r#"{"levels": []}"#).unwrap();

        let layout = LayoutFile { id: "de".to_string(), path };
        assert!(matches!(layout.load(), Err(LayoutError::Parse { .. })));
    }

    #[test]
    fn load_ignores_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.json");
        fs::write(&path, r#"{"name": "German", "locale": "de", "levels": []}"#).unwrap();

        let layout = LayoutFile { id: "de".to_string(), path };
        assert_eq!(layout.load().unwrap().name, "German");
    }
}
