#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for the Warden permission gate.
//!
//! # Usage
//!
//! ```rust,no_run
//! use warden_config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("approval timeout: {}s", config.security.approval_timeout_secs);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **User** (`$WARDEN_HOME/config.toml`, else `~/.warden/config.toml`)
//! 2. **System** (`/etc/warden/config.toml`)
//! 3. **Environment variables** (`WARDEN_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other warden crates. Conversion into
//! domain types happens in the runtime.

/// Environment variable fallbacks.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layer merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is malformed or validation fails.
    pub fn load() -> ConfigResult<Self> {
        loader::load(None)
    }

    /// Load with an explicit warden home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is malformed or validation fails.
    pub fn load_with_home(home: &std::path::Path) -> ConfigResult<Self> {
        loader::load(Some(home))
    }

    /// Load a single file on top of the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, malformed, or invalid.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
