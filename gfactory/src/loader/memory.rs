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
//! In-process loader backend
//!
//! Serves symbol tables that live in the host binary under library-like
//! paths. Plugin bundles linked into the executable go through exactly the
//! same version handshake, registration and lifetime rules as real shared
//! libraries.

use super::{LoaderBackend, NativeLibrary, RawSymbol};
use crate::abi::{AbiVersionFn, RegisterFn, ABI_VERSION_SYMBOL, REGISTER_SYMBOL};
use crate::error::{RegistryError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Symbol table standing in for a shared library
#[derive(Clone, Default)]
pub struct MemoryLibrary {
    symbols: HashMap<String, RawSymbol>,
}

impl MemoryLibrary {
    /// Empty symbol table
    pub fn new() -> Self {
        Self::default()
    }

    /// Symbol table exporting the two plugin entry points
    pub fn plugin(version: AbiVersionFn, register: RegisterFn) -> Self {
        Self::new()
            .with_symbol(ABI_VERSION_SYMBOL, RawSymbol::from_abi_version_fn(version))
            .with_symbol(REGISTER_SYMBOL, RawSymbol::from_register_fn(register))
    }

    /// Add or replace an exported symbol
    pub fn with_symbol(mut self, name: impl Into<String>, symbol: RawSymbol) -> Self {
        self.symbols.insert(name.into(), symbol);
        self
    }
}

impl fmt::Debug for MemoryLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.symbols.keys().collect();
        names.sort();
        f.debug_struct("MemoryLibrary").field("symbols", &names).finish()
    }
}

impl NativeLibrary for MemoryLibrary {
    fn resolve_symbol(&self, name: &str) -> Option<RawSymbol> {
        self.symbols.get(name).copied()
    }

    fn close(self: Box<Self>) -> std::result::Result<(), String> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    libraries: HashMap<PathBuf, MemoryLibrary>,
    open: HashMap<PathBuf, usize>,
}

/// [`LoaderBackend`] serving [`MemoryLibrary`] tables
///
/// Clones share state, so a test can keep one clone to inspect which
/// libraries are currently open while the registry owns another.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Backend with no libraries
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `library` available under `path`
    pub fn insert(&self, path: impl Into<PathBuf>, library: MemoryLibrary) {
        self.state.lock().libraries.insert(path.into(), library);
    }

    /// Number of currently open instances of the library at `path`
    pub fn open_count(&self, path: impl AsRef<Path>) -> usize {
        self.state
            .lock()
            .open
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryBackend")
            .field("libraries", &state.libraries.len())
            .field("open", &state.open)
            .finish()
    }
}

impl LoaderBackend for MemoryBackend {
    fn open(&self, path: &Path) -> Result<(PathBuf, Box<dyn NativeLibrary>)> {
        let mut state = self.state.lock();
        let library = state
            .libraries
            .get(path)
            .cloned()
            .ok_or_else(|| RegistryError::LibraryNotFound {
                path: path.to_path_buf(),
                reason: "no in-memory library registered under this path".to_string(),
            })?;
        *state.open.entry(path.to_path_buf()).or_insert(0) += 1;

        let opened = OpenedMemoryLibrary {
            library,
            path: path.to_path_buf(),
            state: Arc::clone(&self.state),
        };
        Ok((path.to_path_buf(), Box::new(opened)))
    }
}

/// An open instance; dropping it counts as closing it
struct OpenedMemoryLibrary {
    library: MemoryLibrary,
    path: PathBuf,
    state: Arc<Mutex<MemoryState>>,
}

impl NativeLibrary for OpenedMemoryLibrary {
    fn resolve_symbol(&self, name: &str) -> Option<RawSymbol> {
        self.library.resolve_symbol(name)
    }

    fn close(self: Box<Self>) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl Drop for OpenedMemoryLibrary {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if let Some(count) = state.open.get_mut(&self.path) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.open.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_counts() {
        let backend = MemoryBackend::new();
        backend.insert("libshapes.so", MemoryLibrary::new());

        let (_, first) = backend.open(Path::new("libshapes.so")).unwrap();
        let (_, second) = backend.open(Path::new("libshapes.so")).unwrap();
        assert_eq!(backend.open_count("libshapes.so"), 2);

        first.close().unwrap();
        assert_eq!(backend.open_count("libshapes.so"), 1);
        drop(second);
        assert_eq!(backend.open_count("libshapes.so"), 0);
    }

    #[test]
    fn test_unknown_path() {
        let backend = MemoryBackend::new();
        let result = backend.open(Path::new("libcars.so"));
        assert!(matches!(result, Err(RegistryError::LibraryNotFound { .. })));
        assert_eq!(backend.open_count("libcars.so"), 0);
    }

    #[test]
    fn test_symbols() {
        extern "C" fn version() -> *const std::os::raw::c_char {
            crate::abi::ABI_VERSION_NUL.as_ptr().cast()
        }

        let library = MemoryLibrary::new()
            .with_symbol("gfactory_abi_version", RawSymbol::from_abi_version_fn(version));
        assert!(library.resolve_symbol("gfactory_abi_version").is_some());
        assert!(library.resolve_symbol("gfactory_register").is_none());
        assert!(format!("{library:?}").contains("gfactory_abi_version"));
    }
}
