//! On-disk persistence of the session token.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::error::CredentialError;

/// Key the token is stored under.
pub const TOKEN_KEY: &str = "linkedagent_token";

/// A small JSON key/value file holding the bearer token between runs.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/linkedagent/credentials.json`
    pub fn default_path() -> Result<PathBuf, CredentialError> {
        dirs::data_dir()
            .map(|dir| dir.join("linkedagent").join("credentials.json"))
            .ok_or(CredentialError::NoDataDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored token, if any.
    pub fn load(&self) -> Result<Option<SecretString>, CredentialError> {
        let entries = self.read_entries()?;
        Ok(entries
            .get(TOKEN_KEY)
            .filter(|token| !token.is_empty())
            .map(|token| SecretString::from(token.clone())))
    }

    pub fn save(&self, token: &SecretString) -> Result<(), CredentialError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(CredentialError::Parse { .. }) => {
                log::warn!(
                    "Replacing unreadable credential file {}",
                    self.path.display()
                );
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        entries.insert(TOKEN_KEY.to_string(), token.expose_secret().to_string());
        self.write_entries(&entries)
    }

    /// Removes the token. The file goes away once it holds nothing else.
    pub fn clear(&self) -> Result<(), CredentialError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(CredentialError::Parse { .. }) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        entries.remove(TOKEN_KEY);

        if entries.is_empty() {
            match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(CredentialError::Write {
                    path: self.path.clone(),
                    source,
                }),
            }
        } else {
            self.write_entries(&entries)
        }
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(CredentialError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), CredentialError> {
        let write_err = |source| CredentialError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(entries).map_err(|e| CredentialError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        fs::write(&self.path, json).map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_has_no_token() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("creds.json");
        let store = CredentialStore::new(&path);

        store.save(&SecretString::from("la_abc".to_string())).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains(TOKEN_KEY));

        let token = store.load().unwrap().unwrap();
        assert_eq!(token.expose_secret(), "la_abc");

        store.clear().unwrap();
        assert!(!path.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_clear_keeps_other_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, r#"{"linkedagent_token":"t","theme":"dark"}"#).unwrap();

        let store = CredentialStore::new(&path);
        store.clear().unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("theme"));
        assert!(!raw.contains(TOKEN_KEY));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("creds.json");
        fs::write(&path, "{not json").unwrap();

        let store = CredentialStore::new(&path);
        assert!(matches!(store.load(), Err(CredentialError::Parse { .. })));

        store.save(&SecretString::from("fresh".to_string())).unwrap();
        assert_eq!(store.load().unwrap().unwrap().expose_secret(), "fresh");
    }
}
