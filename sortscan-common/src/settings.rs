//! Settings store
//!
//! Holds the analysis-service credential in its own namespace
//! ([`SETTINGS_KEY`]) as `{ "geminiApiKey": "..." | null }`. Scans and
//! settings never share a document.

use crate::store::{KeyValueStore, SETTINGS_KEY};
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsDocument {
    #[serde(default)]
    gemini_api_key: Option<String>,
}

/// Persisted user settings
pub struct SettingsStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SettingsStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get the stored API key
    ///
    /// Returns `None` when nothing is stored, the stored value is blank, or
    /// the document cannot be parsed.
    pub fn get(&self) -> Result<Option<String>> {
        Ok(self.load()?.gemini_api_key.filter(|k| !k.trim().is_empty()))
    }

    /// Set or clear (`None`) the API key
    ///
    /// Blank input clears the key. Surrounding whitespace is trimmed.
    pub fn set(&self, key: Option<String>) -> Result<()> {
        let key = key.as_deref().map(str::trim).filter(|k| !k.is_empty());
        let document = SettingsDocument {
            gemini_api_key: key.map(str::to_string),
        };
        self.store
            .write(SETTINGS_KEY, &serde_json::to_string(&document)?)?;

        if key.is_some() {
            info!("API key stored in settings");
        } else {
            info!("API key cleared from settings");
        }
        Ok(())
    }

    /// Whether a usable API key is stored
    pub fn exists(&self) -> Result<bool> {
        Ok(self.get()?.is_some())
    }

    fn load(&self) -> Result<SettingsDocument> {
        let Some(raw) = self.store.read(SETTINGS_KEY)? else {
            return Ok(SettingsDocument::default());
        };
        match serde_json::from_str(&raw) {
            Ok(document) => Ok(document),
            Err(e) => {
                warn!("Settings document is malformed, treating as empty: {}", e);
                Ok(SettingsDocument::default())
            }
        }
    }
}
