//! Plugin registry.
//!
//! Holds the installed [`PluginDefinition`]s keyed by name. Definitions come
//! from two places with different trust: operator-owned TOML files, which may
//! use any execution type, and the conversational creation flow, which may
//! not create `script` plugins.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};
use warden_core::{DefinitionOrigin, ExecutionSpec, ExecutionType, PluginDefinition};

use crate::error::{RuntimeError, RuntimeResult};

/// Definition files larger than this are refused.
const MAX_DEFINITION_BYTES: u64 = 256 * 1024;

/// Registry of installed plugin definitions.
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<PluginDefinition>>>,
    reserved: HashSet<String>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish_non_exhaustive()
    }
}

impl PluginRegistry {
    /// Create an empty registry. `reserved` names (the built-in tools) can
    /// never be taken by a plugin.
    #[must_use]
    pub fn new<I, S>(reserved: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plugins: RwLock::new(HashMap::new()),
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    /// Install an operator definition file, replacing any plugin of the same
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidDefinition`] if the file cannot be read
    /// or parsed, and the validation errors of [`Self::insert`].
    pub fn install_file(&self, path: &Path) -> RuntimeResult<Arc<PluginDefinition>> {
        let invalid = |reason: String| RuntimeError::InvalidDefinition {
            path: path.to_path_buf(),
            reason,
        };
        let size = std::fs::metadata(path).map_err(|e| invalid(e.to_string()))?.len();
        if size > MAX_DEFINITION_BYTES {
            return Err(invalid(format!("file is larger than {MAX_DEFINITION_BYTES} bytes")));
        }
        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let mut definition: PluginDefinition =
            toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        definition.origin = DefinitionOrigin::OperatorFile;
        self.insert(definition)
    }

    /// Install every `*.toml` file in `dir`, in name order.
    ///
    /// Invalid files are logged and skipped so one bad definition does not
    /// take the others down. Returns the number installed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if `dir` cannot be listed.
    pub fn load_dir(&self, dir: &Path) -> RuntimeResult<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut installed: usize = 0;
        for path in &paths {
            match self.install_file(path) {
                Ok(def) => {
                    debug!(plugin = %def.name, path = %path.display(), "Loaded plugin definition");
                    installed = installed.saturating_add(1);
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping plugin definition");
                },
            }
        }
        info!(dir = %dir.display(), installed, "Plugin definitions loaded");
        Ok(installed)
    }

    /// Register a definition produced by the conversational creation flow.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::DisallowedExecutionType`] for `script` definitions
    /// - [`RuntimeError::NameConflict`] if an operator plugin has the name
    /// - the validation errors of [`Self::insert`]
    pub fn create_conversational(
        &self,
        mut definition: PluginDefinition,
    ) -> RuntimeResult<Arc<PluginDefinition>> {
        if definition.execution_type() == ExecutionType::Script {
            warn!(plugin = %definition.name, "Refusing conversational script plugin");
            return Err(RuntimeError::DisallowedExecutionType {
                name: definition.name,
                execution: ExecutionType::Script,
            });
        }
        if self
            .get(&definition.name)
            .is_some_and(|existing| existing.origin == DefinitionOrigin::OperatorFile)
        {
            return Err(RuntimeError::NameConflict(definition.name));
        }
        definition.origin = DefinitionOrigin::Conversational;
        self.insert(definition)
    }

    /// Validate and store a definition whose origin is already set.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidPluginName`] for names outside `[a-z0-9_-]+`
    /// - [`RuntimeError::NameConflict`] for names of built-in tools
    /// - [`RuntimeError::DuplicateParameter`] for repeated parameters
    /// - [`RuntimeError::UnsafeCommandTemplate`] for bash commands with a
    ///   quoted or escaped placeholder
    pub fn insert(&self, definition: PluginDefinition) -> RuntimeResult<Arc<PluginDefinition>> {
        if !is_valid_name(&definition.name) {
            return Err(RuntimeError::InvalidPluginName(definition.name));
        }
        if self.reserved.contains(&definition.name) {
            return Err(RuntimeError::NameConflict(definition.name));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = definition
            .parameters
            .iter()
            .find(|p| !seen.insert(p.name.as_str()))
        {
            return Err(RuntimeError::DuplicateParameter {
                name: definition.name.clone(),
                parameter: dup.name.clone(),
            });
        }
        if let ExecutionSpec::Bash { command } = &definition.execution
            && let Err(e) = warden_sandbox::check_command_template(command)
        {
            return Err(RuntimeError::UnsafeCommandTemplate {
                name: definition.name.clone(),
                reason: e.to_string(),
            });
        }

        let definition = Arc::new(definition);
        let replaced = self
            .write()
            .insert(definition.name.clone(), Arc::clone(&definition))
            .is_some();
        info!(
            plugin = %definition.name,
            execution = %definition.execution_type(),
            origin = ?definition.origin,
            replaced,
            "Registered plugin"
        );
        Ok(definition)
    }

    /// Look up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<PluginDefinition>> {
        self.read().get(name).cloned()
    }

    /// Remove a plugin, returning it if it was present.
    pub fn remove(&self, name: &str) -> Option<Arc<PluginDefinition>> {
        let removed = self.write().remove(name);
        if removed.is_some() {
            info!(plugin = name, "Unregistered plugin");
        }
        removed
    }

    /// Installed plugin names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of installed plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no plugins are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<PluginDefinition>>> {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<PluginDefinition>>> {
        self.plugins.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}
