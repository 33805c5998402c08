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
//! Platform loader backend

use super::{LoaderBackend, NativeLibrary, RawSymbol};
use crate::error::{RegistryError, Result};
use libloading::Library;
use std::path::{Path, PathBuf};

/// [`LoaderBackend`] over the operating system's dynamic loader
///
/// A path is tried as given first. If no such file exists, each search
/// directory is tried in order, first joined with the path itself and then
/// with the platform library file name for it (`libtesla.so` for `tesla` on
/// Linux). As a last resort the path is handed to the platform loader
/// unchanged so that its own search rules apply.
#[derive(Debug, Clone, Default)]
pub struct DylibBackend {
    search_paths: Vec<PathBuf>,
}

impl DylibBackend {
    /// Create a backend searching the given directories
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        DylibBackend { search_paths }
    }

    /// Configured search directories
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the file a request refers to, if it exists on disk
    pub fn locate(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        for dir in &self.search_paths {
            let candidate = dir.join(path);
            if candidate.is_file() {
                return Some(candidate);
            }

            let candidate = dir.join(libloading::library_filename(path.as_os_str()));
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        None
    }
}

impl LoaderBackend for DylibBackend {
    fn open(&self, path: &Path) -> Result<(PathBuf, Box<dyn NativeLibrary>)> {
        let target = match self.locate(path) {
            Some(found) => found,
            None => {
                tracing::debug!(
                    path = %path.display(),
                    "Not found in search paths, deferring to platform loader"
                );
                path.to_path_buf()
            }
        };

        // SAFETY: loading a library runs its initialisers. Callers of the
        // registry opt into trusting the libraries they name.
        let library =
            unsafe { Library::new(&target) }.map_err(|e| RegistryError::LibraryNotFound {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok((target, Box::new(DylibLibrary { library })))
    }
}

struct DylibLibrary {
    library: Library,
}

impl NativeLibrary for DylibLibrary {
    fn resolve_symbol(&self, name: &str) -> Option<RawSymbol> {
        // SAFETY: the symbol is read as an untyped address only; the loader
        // casts it to the signature fixed by the ABI contract.
        let symbol = unsafe { self.library.get::<*const ()>(name.as_bytes()) }.ok()?;
        RawSymbol::from_ptr(*symbol)
    }

    fn close(self: Box<Self>) -> std::result::Result<(), String> {
        self.library.close().map_err(|e| e.to_string())
    }
}
