//! Operator-controlled secret store.
//!
//! Templates reference secrets as `{{secret.NAME}}`. Values never come from
//! caller-supplied data and are never printed by `Debug` or serialized.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Serialize, Serializer};

use crate::error::{SandboxError, SandboxResult};

/// Thread-safe secret storage.
#[derive(Clone, Default)]
pub struct Secrets {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.keys();
        f.debug_struct("Secrets")
            .field("count", &keys.len())
            .field("keys", &keys)
            .finish()
    }
}

/// Serializes key names only.
impl Serialize for Secrets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.keys().serialize(serializer)
    }
}

impl Secrets {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a flat `NAME = "value"` TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Secrets`] if the file is group or world
    /// accessible, and I/O or parse errors otherwise.
    pub fn load(path: impl AsRef<Path>) -> SandboxResult<Self> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = file.metadata()?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(SandboxError::Secrets(format!(
                    "secrets file {} has insecure permissions {:o}, should be 0600",
                    path.display(),
                    mode & 0o777
                )));
            }
        }

        let mut contents = String::new();
        std::io::Read::read_to_string(&mut file, &mut contents)?;
        let map: HashMap<String, String> = toml::from_str(&contents)
            .map_err(|e| SandboxError::Secrets(format!("{}: {e}", path.display())))?;
        Ok(Self {
            inner: Arc::new(RwLock::new(map)),
        })
    }

    /// Get a secret.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Set a secret.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Whether a secret exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Secret names, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_serialize_hide_values() {
        let secrets = Secrets::new();
        secrets.set("API_KEY", "hunter2");
        assert!(!format!("{secrets:?}").contains("hunter2"));
        let json = serde_json::to_string(&secrets).unwrap();
        assert_eq!(json, r#"["API_KEY"]"#);
    }

    #[cfg(unix)]
    #[test]
    fn load_rejects_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, "API_KEY = \"hunter2\"\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(Secrets::load(&path), Err(SandboxError::Secrets(_))));

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load(&path).unwrap();
        assert_eq!(secrets.get("API_KEY").as_deref(), Some("hunter2"));
        assert!(secrets.contains("API_KEY"));
        assert!(!secrets.contains("OTHER"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        assert!(matches!(
            Secrets::load("/nonexistent/secrets.toml"),
            Err(SandboxError::Io(_))
        ));
    }
}
