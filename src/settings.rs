use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "rasterview";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting {name}: {detail}")]
    Invalid { name: &'static str, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Resolution of the navigation window, in dpi
    #[serde(default = "default_overview_resolution")]
    pub overview_resolution: f32,

    /// Starting resolution of the zoomed window, in dpi
    #[serde(default = "default_detail_resolution")]
    pub detail_resolution: f32,

    /// Zoom in multiplies and zoom out divides the detail resolution by this
    #[serde(default = "default_zoom_factor")]
    pub zoom_factor: f32,

    #[serde(default = "default_viewport_width")]
    pub detail_viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub detail_viewport_height: u32,

    /// Largest raster accepted at presize
    #[serde(default = "default_max_raster_bytes")]
    pub max_raster_bytes: u64,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_overview_resolution() -> f32 {
    72.0
}

fn default_detail_resolution() -> f32 {
    288.0
}

fn default_zoom_factor() -> f32 {
    2.0
}

fn default_viewport_width() -> u32 {
    800
}

fn default_viewport_height() -> u32 {
    600
}

fn default_max_raster_bytes() -> u64 {
    256 << 20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            overview_resolution: default_overview_resolution(),
            detail_resolution: default_detail_resolution(),
            zoom_factor: default_zoom_factor(),
            detail_viewport_width: default_viewport_width(),
            detail_viewport_height: default_viewport_height(),
            max_raster_bytes: default_max_raster_bytes(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, value) in [
            ("overview_resolution", self.overview_resolution),
            ("detail_resolution", self.detail_resolution),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SettingsError::Invalid {
                    name,
                    detail: format!("{value} is not a positive resolution"),
                });
            }
        }
        if !(self.zoom_factor.is_finite() && self.zoom_factor > 1.0) {
            return Err(SettingsError::Invalid {
                name: "zoom_factor",
                detail: format!("{} must be greater than 1", self.zoom_factor),
            });
        }
        if self.detail_viewport_width == 0 || self.detail_viewport_height == 0 {
            return Err(SettingsError::Invalid {
                name: "detail_viewport",
                detail: format!(
                    "{}x{} is empty",
                    self.detail_viewport_width, self.detail_viewport_height
                ),
            });
        }
        if self.max_raster_bytes == 0 {
            return Err(SettingsError::Invalid {
                name: "max_raster_bytes",
                detail: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Read and validate a settings file, migrating old versions in memory
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }
        fs::write(path, generate_settings_yaml(self)).map_err(io_error)
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load the user's settings into the global store, creating the file with
/// defaults when it does not exist yet
pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Err(e) = get_settings().save_to_path(&path) {
            error!("Failed to save settings: {e}");
        }
    }
}

/// Load `path` into the global store; keeps the current settings on error
pub fn load_settings_from_path(path: &Path) {
    match Settings::load_from_path(path) {
        Ok(settings) => {
            debug!("Loaded settings from {path:?}");
            *SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
        }
        Err(e) => error!("Failed to load settings: {e}"),
    }
}

pub fn save_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, cannot save settings");
        return;
    };
    match get_settings().save_to_path(&path) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings: {e}"),
    }
}

#[must_use]
pub fn get_settings() -> Settings {
    SETTINGS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_settings(settings: Settings) {
    *SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Future migrations go here:
    // if settings.version < 2 {
    //     migrate_v1_to_v2(settings);
    // }

    settings.version = CURRENT_VERSION;
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str("\n# Navigation window resolution (dpi)\n");
    content.push_str(&format!(
        "overview_resolution: {}\n",
        settings.overview_resolution
    ));
    content.push_str("\n# Zoomed window starting resolution (dpi)\n");
    content.push_str(&format!(
        "detail_resolution: {}\n",
        settings.detail_resolution
    ));
    content.push_str("\n# Resolution multiplier per zoom step (> 1)\n");
    content.push_str(&format!("zoom_factor: {}\n", settings.zoom_factor));
    content.push_str("\n# Zoomed window size in pixels\n");
    content.push_str(&format!(
        "detail_viewport_width: {}\n",
        settings.detail_viewport_width
    ));
    content.push_str(&format!(
        "detail_viewport_height: {}\n",
        settings.detail_viewport_height
    ));
    content.push_str("\n# Largest page raster accepted, in bytes\n");
    content.push_str(&format!("max_raster_bytes: {}\n", settings.max_raster_bytes));

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn generated_yaml_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);
        let settings = Settings {
            detail_resolution: 600.0,
            detail_viewport_width: 200,
            ..Settings::default()
        };
        settings.save_to_path(&path).unwrap();
        assert_eq!(Settings::load_from_path(&path).unwrap(), settings);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "zoom_factor: 3\n").unwrap();
        let settings = Settings::load_from_path(&path).unwrap();
        assert_eq!(settings.zoom_factor, 3.0);
        assert_eq!(settings.overview_resolution, 72.0);
    }

    #[test]
    fn old_version_is_migrated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "version: 0\n").unwrap();
        assert_eq!(
            Settings::load_from_path(&path).unwrap().version,
            CURRENT_VERSION
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "detail_resolution: -5\n").unwrap();
        assert!(matches!(
            Settings::load_from_path(&path),
            Err(SettingsError::Invalid {
                name: "detail_resolution",
                ..
            })
        ));

        let settings = Settings {
            zoom_factor: 1.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unparsable_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        fs::write(&path, "zoom_factor: [").unwrap();
        assert!(matches!(
            Settings::load_from_path(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    #[serial]
    fn global_store_keeps_settings_on_bad_file() {
        set_settings(Settings::default());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);

        fs::write(&path, "overview_resolution: 50\n").unwrap();
        load_settings_from_path(&path);
        assert_eq!(get_settings().overview_resolution, 50.0);

        fs::write(&path, "overview_resolution: 0\n").unwrap();
        load_settings_from_path(&path);
        assert_eq!(get_settings().overview_resolution, 50.0);

        set_settings(Settings::default());
    }
}
