//! Configuration TOML de VeilBrows.
//!
//! Chaque section porte `#[serde(default)]` : un fichier partiel ou absent
//! donne la politique produit par défaut. Le fichier est cherché, dans
//! l'ordre, via `VEILBROWS_CONFIG`, à côté de l'exécutable, dans le
//! répertoire de configuration de la plateforme, puis dans le répertoire
//! courant.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tracking::CategorySet;

// ─────────────────────────────────────────────────────────────────────────────
// Config structs
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub search: SearchConfig,
    pub privacy: PrivacyConfig,
    pub engine: EngineConfig,
}

/// Product identity and locale, used by the internal pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub app_name: String,
    pub version: String,
    pub build_number: u32,
    /// BCP-47 tag, e.g. `en-US`, `fr`, `ar`.
    pub locale: String,
}

/// Search engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Query URL; `%s` is replaced by the form-encoded search terms.
    pub query_template: String,
}

/// Tracking-protection defaults. The live values are owned by the
/// [`crate::preferences::PreferenceStore`], seeded from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub block_ads: bool,
    pub block_analytics: bool,
    pub block_social: bool,
    pub block_other: bool,
    pub block_images: bool,
}

/// Which rendering backend new sessions get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Platform-provided renderer; tracking protection by request interception.
    #[default]
    System,
    /// Embedded renderer; tracking protection by category flags.
    Standalone,
}

/// Engine backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: EngineKind,
    /// User-agent string. Empty = renderer default.
    pub user_agent: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Default impls
// ─────────────────────────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "VeilBrows".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_number: 1,
            locale: "en-US".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query_template: "https://duckduckgo.com/?q=%s".to_string(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            block_ads: true,
            block_analytics: true,
            block_social: true,
            block_other: false,
            block_images: false,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineKind::System,
            user_agent: String::new(),
        }
    }
}

impl PrivacyConfig {
    /// The enabled tracker categories.
    pub fn categories(&self) -> CategorySet {
        CategorySet::from_flags(
            self.block_ads,
            self.block_analytics,
            self.block_social,
            self.block_other,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config loading and saving
// ─────────────────────────────────────────────────────────────────────────────

/// Environment variable naming an explicit config file.
const CONFIG_ENV: &str = "VEILBROWS_CONFIG";
const CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Premier fichier trouvé parmi [`config_candidates`], ou les valeurs
    /// par défaut. Un fichier illisible ou invalide est signalé puis ignoré.
    pub fn load() -> Self {
        let Some(path) = config_candidates().into_iter().find(|p| p.is_file()) else {
            info!("No config file found, using defaults");
            return Self::default();
        };
        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| toml::from_str::<Config>(&content).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => {
                info!(path = %path.display(), backend = ?config.engine.backend, "Configuration loaded");
                config
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "Unusable config file, using defaults");
                Self::default()
            }
        }
    }

    /// Écrit la configuration dans le répertoire de la plateforme.
    pub fn save(&self) -> io::Result<()> {
        let path = save_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(&path, content)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

/// Emplacements possibles, du plus explicite au plus générique.
fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        candidates.push(PathBuf::from(path));
    }
    if let Some(dir) = std::env::current_exe().ok().as_deref().and_then(Path::parent) {
        candidates.push(dir.join(CONFIG_FILE));
    }
    candidates.extend(platform_config_dir().map(|dir| dir.join(CONFIG_FILE)));
    candidates.push(PathBuf::from(CONFIG_FILE));
    candidates
}

fn save_path() -> PathBuf {
    platform_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE)
}

/// `%APPDATA%\VeilBrows` ou `$XDG_CONFIG_HOME/veilbrows` (`~/.config` à défaut).
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var_os("APPDATA").map(|appdata| PathBuf::from(appdata).join("VeilBrows"))
    }
    #[cfg(not(windows))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .map(|dir| dir.join("veilbrows"))
    }
}
