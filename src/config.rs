use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants::constants;

const APP_NAME: &str = "gg-shuffle";

/// User preferences persisted in `prefs.toml`.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub theme_name: Option<String>,
  pub display_mode: Option<String>,
  pub db_path: Option<PathBuf>,
  pub cache_dir: Option<PathBuf>,
  pub channel_url: Option<String>,
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", APP_NAME)
}

impl Config {
  pub fn load() -> Self {
    match project_dirs() {
      Some(dirs) => Self::load_from(&dirs.config_dir().join("prefs.toml")),
      None => Self::default(),
    }
  }

  /// Missing or malformed files fall back to defaults.
  pub fn load_from(path: &Path) -> Self {
    let Ok(content) = std::fs::read_to_string(path) else {
      return Self::default();
    };
    match toml::from_str(&content) {
      Ok(config) => config,
      Err(e) => {
        warn!(path = %path.display(), err = %e, "ignoring malformed prefs");
        Self::default()
      }
    }
  }

  pub fn save(&self) {
    if let Some(dirs) = project_dirs()
      && let Err(e) = self.save_to(&dirs.config_dir().join("prefs.toml"))
    {
      warn!(err = %format!("{:#}", e), "failed to save prefs");
    }
  }

  pub fn save_to(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let content = toml::to_string(self).context("Failed to serialize prefs")?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
  }

  pub fn channel_url(&self) -> String {
    self.channel_url.clone().unwrap_or_else(|| constants().default_channel.clone())
  }
}

/// Filesystem locations, resolved once at startup and handed to the components that need them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
  pub db: PathBuf,
  pub thumbnails: PathBuf,
  pub logs: PathBuf,
}

impl Paths {
  /// Precedence: explicit CLI path, then prefs, then the platform data/cache dirs.
  pub fn resolve(cli_db: Option<PathBuf>, config: &Config) -> Self {
    let dirs = project_dirs();
    let data_dir = dirs.as_ref().map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf());
    let cache_dir = dirs.as_ref().map_or_else(|| PathBuf::from(".cache"), |d| d.cache_dir().to_path_buf());
    Self::resolve_in(cli_db, config, &data_dir, &cache_dir)
  }

  fn resolve_in(cli_db: Option<PathBuf>, config: &Config, data_dir: &Path, cache_dir: &Path) -> Self {
    Self {
      db: cli_db.or_else(|| config.db_path.clone()).unwrap_or_else(|| data_dir.join("catalog.db")),
      thumbnails: config.cache_dir.clone().unwrap_or_else(|| cache_dir.join("thumbs")),
      logs: data_dir.join("logs"),
    }
  }
}
