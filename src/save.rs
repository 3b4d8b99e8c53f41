//! Persistent save record for the clicker game served behind the cache.
//!
//! The game keeps one JSON blob under a fixed storage key. This module owns
//! that blob as a typed record with explicit load and save points; it holds
//! no game rules.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Storage key the game saves under.
pub const STORAGE_KEY: &str = "offline-clicker-v1";

/// Level and base cost of one upgrade track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upgrade {
    pub level: u32,
    pub base_cost: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

impl Upgrade {
    const fn new(base_cost: u64) -> Self {
        Self {
            level: 0,
            base_cost,
            interval: None,
        }
    }
}

/// All upgrade tracks. A track missing from a save starts fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Upgrades {
    pub click_power: Upgrade,
    pub multiplier: Upgrade,
    pub autoclicker: Upgrade,
}

/// Player settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sound: bool,
}

impl Default for Upgrades {
    fn default() -> Self {
        Self {
            click_power: Upgrade::new(10),
            multiplier: Upgrade::new(50),
            autoclicker: Upgrade {
                interval: Some(1000),
                ..Upgrade::new(100)
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self { sound: true }
    }
}

/// The whole save blob, in the game's own JSON shape.
///
/// Fields missing from an older save take their new-game values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameState {
    pub score: f64,
    pub click_power: f64,
    pub multiplier: f64,
    pub per_second: f64,
    pub upgrades: Upgrades,
    pub prestige: u32,
    pub settings: Settings,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            score: 0.0,
            click_power: 1.0,
            multiplier: 1.0,
            per_second: 0.0,
            upgrades: Upgrades::default(),
            prestige: 0,
            settings: Settings::default(),
        }
    }
}

/// A save slot backed by a JSON file named after the storage key.
#[derive(Debug, Clone)]
pub struct SaveFile {
    path: PathBuf,
}

impl SaveFile {
    /// Creates a slot at `dir/<key>.json`.
    #[must_use]
    pub fn new(dir: &Path, key: &str) -> Self {
        Self {
            path: dir.join(format!("{key}.json")),
        }
    }

    /// Returns the default save directory.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("offline-cache")
            .join("saves")
    }

    /// Returns the file backing this slot.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved state.
    ///
    /// A missing or unreadable save yields `None`; the caller starts from
    /// [`GameState::default`].
    #[must_use]
    pub fn load(&self) -> Option<GameState> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Load failed for {}: {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("Load failed for {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Loads the saved state or falls back to defaults.
    #[must_use]
    pub fn load_or_default(&self) -> GameState {
        self.load().unwrap_or_default()
    }

    /// Saves the state atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, state: &GameState) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Removes the save file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> crate::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
