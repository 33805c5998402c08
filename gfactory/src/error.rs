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
//! Error types for the factory registry

use std::fmt;
use std::path::PathBuf;

/// Result type alias using [`RegistryError`]
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Errors produced by registry, loader and handle operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// A factory is already registered under this key
    #[error("factory key '{key}' is already registered")]
    DuplicateKey {
        /// Conflicting key
        key: String,
    },

    /// No factory is registered under this key
    #[error("no factory registered under key '{key}'")]
    KeyNotFound {
        /// Requested key
        key: String,
    },

    /// The factory produces a different type than the caller expected
    #[error("factory '{key}' produces {actual}, not the requested {expected}")]
    TypeMismatch {
        /// Requested key
        key: String,
        /// Type name the caller asked for
        expected: String,
        /// Type name recorded at registration
        actual: String,
    },

    /// The library could not be located or opened
    #[error("could not load library {}: {reason}", .path.display())]
    LibraryNotFound {
        /// Requested path
        path: PathBuf,
        /// Platform loader message
        reason: String,
    },

    /// A required symbol is missing from the library
    #[error("symbol '{symbol}' not found in {}", .path.display())]
    SymbolNotFound {
        /// Library path
        path: PathBuf,
        /// Missing symbol name
        symbol: String,
    },

    /// The library reports an ABI version the host cannot accept
    #[error("library {} reports ABI version {found}, host expects {expected}", .path.display())]
    AbiMismatch {
        /// Library path
        path: PathBuf,
        /// Version string reported by the library
        found: String,
        /// Host ABI version
        expected: String,
    },

    /// The entry belongs to a dynamic library and cannot be removed on its own
    #[error(
        "factory '{key}' belongs to library {} and can only be removed by unloading it",
        .path.display()
    )]
    LibraryOwned {
        /// Requested key
        key: String,
        /// Owning library path
        path: PathBuf,
    },

    /// The library still has live objects and cannot be closed
    #[error("library {} still has {live} live object(s)", .path.display())]
    LibraryStillInUse {
        /// Library path
        path: PathBuf,
        /// Live object count at the time of the check
        live: usize,
    },

    /// Factory keys must be non-empty
    #[error("factory keys must not be empty")]
    InvalidKey,

    /// The library is already loaded by this registry
    #[error("library {} is already loaded", .path.display())]
    LibraryAlreadyLoaded {
        /// Resolved library path
        path: PathBuf,
    },

    /// The library's registration entry point failed on its own terms
    #[error("plugin registration failed: {0}")]
    PluginFailed(String),

    /// The registry has been torn down
    #[error("registry is closed")]
    RegistryClosed,

    /// The factory panicked while constructing an object
    #[error("factory '{key}' failed to construct an object: {reason}")]
    CreationFailed {
        /// Requested key
        key: String,
        /// Panic message
        reason: String,
    },
}

/// Discriminant of a [`RegistryError`], suitable for structured events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`RegistryError::DuplicateKey`]
    DuplicateKey,
    /// See [`RegistryError::KeyNotFound`]
    KeyNotFound,
    /// See [`RegistryError::TypeMismatch`]
    TypeMismatch,
    /// See [`RegistryError::LibraryNotFound`]
    LibraryNotFound,
    /// See [`RegistryError::SymbolNotFound`]
    SymbolNotFound,
    /// See [`RegistryError::AbiMismatch`]
    AbiMismatch,
    /// See [`RegistryError::LibraryOwned`]
    LibraryOwned,
    /// See [`RegistryError::LibraryStillInUse`]
    LibraryStillInUse,
    /// See [`RegistryError::InvalidKey`]
    InvalidKey,
    /// See [`RegistryError::LibraryAlreadyLoaded`]
    LibraryAlreadyLoaded,
    /// See [`RegistryError::PluginFailed`]
    PluginFailed,
    /// See [`RegistryError::RegistryClosed`]
    RegistryClosed,
    /// See [`RegistryError::CreationFailed`]
    CreationFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl RegistryError {
    /// Create a plugin failure from inside a registration entry point
    pub fn plugin(message: impl Into<String>) -> Self {
        RegistryError::PluginFailed(message.into())
    }

    /// The kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            RegistryError::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            RegistryError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            RegistryError::LibraryNotFound { .. } => ErrorKind::LibraryNotFound,
            RegistryError::SymbolNotFound { .. } => ErrorKind::SymbolNotFound,
            RegistryError::AbiMismatch { .. } => ErrorKind::AbiMismatch,
            RegistryError::LibraryOwned { .. } => ErrorKind::LibraryOwned,
            RegistryError::LibraryStillInUse { .. } => ErrorKind::LibraryStillInUse,
            RegistryError::InvalidKey => ErrorKind::InvalidKey,
            RegistryError::LibraryAlreadyLoaded { .. } => ErrorKind::LibraryAlreadyLoaded,
            RegistryError::PluginFailed(_) => ErrorKind::PluginFailed,
            RegistryError::RegistryClosed => ErrorKind::RegistryClosed,
            RegistryError::CreationFailed { .. } => ErrorKind::CreationFailed,
        }
    }

    /// Whether a caller can reasonably log and carry on, e.g. by falling back
    /// to a default factory
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::KeyNotFound | ErrorKind::TypeMismatch)
    }

    /// Whether the error points at a deployment or configuration problem that
    /// should be surfaced to the user
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AbiMismatch | ErrorKind::SymbolNotFound | ErrorKind::LibraryNotFound
        )
    }
}

/// Failures collected by [`FactoryRegistry::close`](crate::FactoryRegistry::close)
///
/// Teardown keeps going after a library refuses to close, so this carries one
/// error per library that was left open.
#[derive(Debug, thiserror::Error)]
#[error("teardown left {} library handle(s) open", .failures.len())]
pub struct TeardownError {
    /// One entry per library that could not be closed
    pub failures: Vec<RegistryError>,
}
