// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Registry configuration
//!
//! # Environment Configuration
//!
//! Set `GFACTORY_PLUGIN_PATH` to add plugin search directories:
//! ```bash
//! export GFACTORY_PLUGIN_PATH=/opt/plugins:/home/user/plugins
//! ```
//!
//! Set `GFACTORY_ABI_VERSION` to override the ABI version the host accepts
//! (mostly useful when testing plugins against a newer host).
//!
//! # Startup Options
//!
//! [`StartupOptions`] reads the plugin-related entries of a parsed option map:
//!
//! | key         | value                                       |
//! |-------------|---------------------------------------------|
//! | `plugins`   | comma-separated library paths to load       |
//! | `factories` | comma-separated factory keys to instantiate |

use crate::abi::host_abi_version;
use semver::Version;
use std::env;
use std::path::PathBuf;

/// Environment variable listing plugin search directories
pub const PLUGIN_PATH_ENV: &str = "GFACTORY_PLUGIN_PATH";

/// Environment variable overriding the accepted ABI version
pub const ABI_VERSION_ENV: &str = "GFACTORY_ABI_VERSION";

/// Option key listing libraries to load at startup
pub const PLUGINS_OPTION: &str = "plugins";

/// Option key listing factory keys to instantiate at startup
pub const FACTORIES_OPTION: &str = "factories";

/// Configuration for a [`FactoryRegistry`](crate::FactoryRegistry)
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// ABI version the host accepts plugins for
    pub abi_version: Version,
    /// Directories searched for libraries not found as given
    pub search_paths: Vec<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            abi_version: host_abi_version(),
            search_paths: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with the host ABI version and no search paths
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment
    ///
    /// Unset variables leave the defaults in place. An unparsable
    /// `GFACTORY_ABI_VERSION` is ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(paths) = env::var_os(PLUGIN_PATH_ENV) {
            config.search_paths = env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            tracing::debug!(
                count = config.search_paths.len(),
                "Plugin search paths from environment"
            );
        }

        if let Ok(raw) = env::var(ABI_VERSION_ENV) {
            match Version::parse(raw.trim()) {
                Ok(version) => config.abi_version = version,
                Err(e) => {
                    tracing::warn!(
                        value = %raw,
                        error = %e,
                        "Ignoring unparsable {}",
                        ABI_VERSION_ENV
                    )
                }
            }
        }

        config
    }

    /// Add a search directory
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Set the accepted ABI version
    pub fn with_abi_version(mut self, version: Version) -> Self {
        self.abi_version = version;
        self
    }
}

/// Libraries and factories to set up at startup
///
/// Built from the key/value pairs produced by whatever option parser the
/// application uses; keys this type does not know are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupOptions {
    /// Library paths, in load order
    pub libraries: Vec<String>,
    /// Factory keys, in instantiation order
    pub factories: Vec<String>,
}

impl StartupOptions {
    /// Collect options from key/value pairs
    ///
    /// Repeated keys accumulate.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = StartupOptions::default();
        for (key, value) in pairs {
            let target = match key.as_ref() {
                PLUGINS_OPTION => &mut options.libraries,
                FACTORIES_OPTION => &mut options.factories,
                _ => continue,
            };
            target.extend(split_list(value.as_ref()));
        }
        options
    }

    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty() && self.factories.is_empty()
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}
