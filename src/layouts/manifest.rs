//! The `layouts.json` manifest the keyboard reads at startup.

use super::{discover, LayoutError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Input method layout advertised when varnam support is built
pub const VARNAM_LAYOUT_ID: &str = "varnam:ml";
pub const VARNAM_LAYOUT_NAME: &str = "Malayalam (via varnam)";

/// Where a layout comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutSource {
    /// Built-in keyboard layout
    Xkb,
    /// External input method
    Ibus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "type")]
    pub source: LayoutSource,
    #[serde(rename = "layout-id")]
    pub layout_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub layouts: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build the manifest from the descriptors in `dir`.
    ///
    /// Every descriptor is parsed before anything is returned, so a broken
    /// descriptor never yields a partial manifest.
    pub fn from_dir(dir: &Path, varnam: bool) -> Result<Self> {
        let mut layouts = Vec::new();
        for layout in discover(dir)? {
            let descriptor = layout.load()?;
            debug!("Layout '{}': {}", layout.id, descriptor.name);
            layouts.push(ManifestEntry {
                source: LayoutSource::Xkb,
                layout_id: layout.id,
                name: descriptor.name,
            });
        }

        // TODO: derive the ibus entries from the varnam schemes installed at runtime
        if varnam {
            layouts.push(ManifestEntry {
                source: LayoutSource::Ibus,
                layout_id: VARNAM_LAYOUT_ID.to_string(),
                name: VARNAM_LAYOUT_NAME.to_string(),
            });
        }

        Ok(Self { layouts })
    }

    /// Pretty JSON with two-space indent
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(LayoutError::Serialize)
    }

    /// Write the manifest to `path`, replacing any previous content
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| LayoutError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Wrote {} layouts to {}", self.layouts.len(), path.display());
        Ok(())
    }
}
