use crate::domain::{config::ThermoLinkConfig, error::{LinkError, LinkResult}};
use std::path::{Path, PathBuf};
use std::fs;

const APP_DIR: &str = "thermolink";
const PROJECT_DIR: &str = ".thermolink";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: Option<PathBuf>,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> Self {
        Self {
            global_config_path: Self::get_global_config_path(),
            project_config_path: Self::find_project_config_path(),
        }
    }

    /// Load configuration from files.
    ///
    /// Defaults, then the global file, then the project file; the project
    /// `[link]` section replaces the global one when present.
    pub fn load_config(&self) -> LinkResult<ThermoLinkConfig> {
        let mut config = ThermoLinkConfig::default();

        if let Some(global_path) = self.global_config_path.as_ref().filter(|p| p.exists()) {
            config = self.load_config_from_path(global_path)?;
        }

        if let Some(project_path) = self.project_config_path.as_ref().filter(|p| p.exists()) {
            let project_config = self.load_config_from_path(project_path)?;
            config.link = project_config.link;
        }

        Ok(config)
    }

    /// Get global configuration path
    fn get_global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(PROJECT_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> LinkResult<ThermoLinkConfig> {
        let content = fs::read_to_string(path).map_err(|e| LinkError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| LinkError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &ThermoLinkConfig) -> LinkResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| LinkError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| LinkError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Create default project configuration under `path` and return its file.
    pub fn init_project_config(&self, path: &Path) -> LinkResult<PathBuf> {
        let config_dir = path.join(PROJECT_DIR);
        let config_file = config_dir.join(CONFIG_FILE);

        if config_file.exists() {
            return Err(LinkError::Config {
                message: "Project configuration already exists".to_string(),
            });
        }

        fs::create_dir_all(&config_dir).map_err(|e| LinkError::Config {
            message: format!("Failed to create {} directory: {}", PROJECT_DIR, e),
        })?;

        self.save_config_to_path(&config_file, &ThermoLinkConfig::default())?;

        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path (if the platform has one)
    pub fn get_global_config_path_ref(&self) -> Option<&PathBuf> {
        self.global_config_path.as_ref()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
