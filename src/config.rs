//! Story locator settings, read from TOML

use std::fs;
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::error::BlorbError;
use crate::resource::LoadMethod;

/// Companion Blorb extensions, tried in this order
pub const DEFAULT_COMPANION_EXTENSIONS: [&str; 2] = [".blb", ".zblorb"];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Extensions that replace the story's own when probing for a
    /// companion Blorb file
    pub companion_extensions: Vec<String>,
    /// Whether a story wrapped in a PKZIP local entry is inflated
    pub inflate_zipped_stories: bool,
    /// How media resources are handed to players
    pub resource_method: LoadMethod,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        LocatorConfig {
            companion_extensions: DEFAULT_COMPANION_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            inflate_zipped_stories: true,
            resource_method: LoadMethod::FilePos,
        }
    }
}

impl LocatorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, BlorbError> {
        toml::from_str(text).map_err(|e| BlorbError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, BlorbError> {
        debug!("Reading locator configuration from {:?}", path);
        let text = fs::read_to_string(path)
            .map_err(|e| BlorbError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }
}
