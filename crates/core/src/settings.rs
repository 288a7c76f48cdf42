//! Per-project bridge settings
//!
//! Stored as TOML at `<project>/.cssbridge/config.toml`:
//!
//! ```toml
//! auto_clear = true
//! media_reduce = true
//! file_reduce = true
//! use_routes = true
//! current_documents_reduce = true
//! resolve_variables = true
//! resolve_mixins = false
//! auto_expand = true
//!
//! [server]
//! port = 6776
//! read_timeout_secs = 10
//!
//! [[routes]]
//! prefix = "/"
//! directory = "public"
//! ```

use crate::routes::{RouteError, RouteTable};
use crate::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory holding bridge state inside a project
pub const STATE_DIR: &str = ".cssbridge";

/// Settings file name inside [`STATE_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

/// Settings errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Reduction and session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Clear pending changes when the page is reloaded or left
    pub auto_clear: bool,
    /// Match CSS3 `@media` conditions
    pub media_reduce: bool,
    /// Match stylesheets by file name
    pub file_reduce: bool,
    /// Match stylesheets through the route table
    pub use_routes: bool,
    /// Only consider currently opened files
    pub current_documents_reduce: bool,
    /// Follow preprocessor variable references to their assignment
    pub resolve_variables: bool,
    /// Include declarations pulled in through mixins
    pub resolve_mixins: bool,
    /// Show declarations of every pending change as they arrive
    pub auto_expand: bool,
    /// Listener settings
    pub server: ServerSettings,
    /// URL prefix → directory routes
    pub routes: RouteTable,
}

/// Ingestion listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Loopback port (default: 6776)
    pub port: u16,
    /// Per-connection header read timeout (default: 10s)
    pub read_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_clear: true,
            media_reduce: true,
            file_reduce: true,
            use_routes: false,
            current_documents_reduce: true,
            resolve_variables: true,
            resolve_mixins: false,
            auto_expand: true,
            server: ServerSettings::default(),
            routes: RouteTable::new(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            read_timeout_secs: 10,
        }
    }
}

impl Settings {
    /// Path of the settings file for a project
    pub fn path_for(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR).join(CONFIG_FILE)
    }

    /// Load settings for a project, falling back to defaults if absent
    ///
    /// Relative route directories are resolved against `project_root`.
    pub fn load(project_root: &Path) -> Result<Self, SettingsError> {
        let path = Self::path_for(project_root);
        if !path.exists() {
            tracing::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        let mut settings = Self::from_toml(&contents)?;
        settings.routes.rebase(project_root);
        Ok(settings)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Render settings as TOML
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate and write settings for a project
    pub fn save(&self, project_root: &Path) -> Result<(), SettingsError> {
        self.validate()?;
        let path = Self::path_for(project_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, self.to_toml()?).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Check value ranges and routes
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.server.port == 0 {
            return Err(SettingsError::Invalid("server.port must be 1-65535".into()));
        }
        if !(1..=300).contains(&self.server.read_timeout_secs) {
            return Err(SettingsError::Invalid(
                "server.read_timeout_secs must be 1-300".into(),
            ));
        }
        self.routes.validate()?;
        Ok(())
    }
}

/// Example configuration with every option documented
pub fn example_config() -> &'static str {
    r#"# cssbridge settings (.cssbridge/config.toml)

# Clear pending changes when leaving or reloading the page
auto_clear = true

# Reduce strategy
media_reduce = true              # match CSS3 media queries
file_reduce = true               # match stylesheet file name
use_routes = false               # match through [[routes]]
current_documents_reduce = true  # only currently opened files

# Less / Sass
resolve_variables = true
resolve_mixins = false

# Print declarations as changes arrive
auto_expand = true

[server]
port = 6776
read_timeout_secs = 10

# [[routes]]
# prefix = "/"
# directory = "public"
#
# [[routes]]
# prefix = "/static/css/"
# directory = "assets/styles"
"#
}
