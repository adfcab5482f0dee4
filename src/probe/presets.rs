use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_with::hex::Hex;
use serde_with::serde_as;
use tracing::debug;

use crate::error::PresetError;

const PRESETS_FILE_NAME: &str = "presets.json";

/// Key that ends the interactive session.
pub const QUIT_KEY: char = 'q';
/// Key that lists the preset table.
pub const HELP_KEY: char = '?';

#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
struct PresetRecord {
    key: String,
    label: String,
    #[serde_as(as = "Hex")]
    payload: Vec<u8>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
struct PresetFile {
    presets: Vec<PresetRecord>,
}

/// One operator command bound to a single key.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Preset {
    key: char,
    label: String,
    payload: Vec<u8>,
}

impl Preset {
    /// Returns the bound key.
    #[must_use]
    pub fn key(&self) -> char {
        self.key
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the unframed command payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// What a single key press asks the session to do.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OperatorAction<'a> {
    /// End the session in order.
    Quit,
    /// Print the preset table.
    ListPresets,
    /// Dispatch the bound payload.
    Send(&'a Preset),
    /// The key has no binding.
    Unbound(char),
}

/// Key-to-payload table for the interactive probe.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PresetTable {
    presets: Vec<Preset>,
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PresetTable {
    /// Returns the built-in presets.
    #[must_use]
    pub fn builtin() -> Self {
        let presets = [
            ('1', "handshake", vec![0x01, 0x00]),
            ('2', "query firmware version", vec![0x36, 0x00]),
            ('3', "query servo ids", vec![0x05, 0x00]),
            ('4', "read all servo positions", vec![0x0B, 0xFF]),
            ('5', "read battery level", vec![0x27, 0x00]),
        ]
        .into_iter()
        .map(|(key, label, payload)| Preset {
            key,
            label: label.to_string(),
            payload,
        })
        .collect();
        Self { presets }
    }

    /// Loads the preset table from `explicit_path`, the per-user config file,
    /// or the built-in defaults, in that order.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read or is invalid.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, PresetError> {
        if let Some(path) = explicit_path {
            return Self::load_from_path(path);
        }

        match default_presets_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::builtin()),
        }
    }

    /// Loads a JSON preset file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn load_from_path(path: &Path) -> Result<Self, PresetError> {
        let path_display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| PresetError::Io {
            path: path_display.clone(),
            source,
        })?;
        let table = Self::from_json(&raw).map_err(|error| match error {
            PresetError::Parse { source, .. } => PresetError::Parse {
                path: path_display.clone(),
                source,
            },
            other => other,
        })?;
        debug!(path = %path_display, presets = table.presets.len(), "loaded preset table");
        Ok(table)
    }

    /// Parses a JSON preset document.
    ///
    /// ```
    /// use jimu_probe::PresetTable;
    ///
    /// let table = PresetTable::from_json(
    ///     r#"{"presets":[{"key":"r","label":"read","payload":"0bff"}]}"#,
    /// )?;
    /// assert_eq!(Some(&[0x0B, 0xFF][..]), table.get('r').map(|p| p.payload()));
    /// # Ok::<(), jimu_probe::PresetError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON or hex, multi-character keys,
    /// reserved keys, or duplicate keys.
    pub fn from_json(raw: &str) -> Result<Self, PresetError> {
        let file: PresetFile =
            serde_json::from_str(raw).map_err(|source| PresetError::Parse {
                path: "<inline>".to_string(),
                source,
            })?;
        Self::from_records(file.presets)
    }

    fn from_records(records: Vec<PresetRecord>) -> Result<Self, PresetError> {
        let mut seen = HashSet::new();
        let mut presets = Vec::with_capacity(records.len());

        for record in records {
            let mut chars = record.key.chars();
            let key = match (chars.next(), chars.next()) {
                (Some(key), None) => key,
                _ => return Err(PresetError::InvalidKey { key: record.key }),
            };
            if key == QUIT_KEY || key == HELP_KEY {
                return Err(PresetError::ReservedKey { key });
            }
            if !seen.insert(key) {
                return Err(PresetError::DuplicateKey { key });
            }
            presets.push(Preset {
                key,
                label: record.label,
                payload: record.payload,
            });
        }

        Ok(Self { presets })
    }

    /// Returns the preset bound to `key`.
    #[must_use]
    pub fn get(&self, key: char) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.key == key)
    }

    /// Returns the preset bound to `key` or an error naming it.
    ///
    /// # Errors
    ///
    /// Returns an error if no preset is bound to `key`.
    pub fn require(&self, key: char) -> Result<&Preset, PresetError> {
        self.get(key).ok_or(PresetError::UnknownKey { key })
    }

    /// Maps one key press to a session action.
    #[must_use]
    pub fn action_for(&self, key: char) -> OperatorAction<'_> {
        match key {
            QUIT_KEY => OperatorAction::Quit,
            HELP_KEY => OperatorAction::ListPresets,
            other => self
                .get(other)
                .map_or(OperatorAction::Unbound(other), OperatorAction::Send),
        }
    }

    /// Iterates presets in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }
}

fn default_presets_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "jimu-probe")
        .map(|project_dirs| project_dirs.config_dir().join(PRESETS_FILE_NAME))
}
