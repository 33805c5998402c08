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
//! Opened shared libraries and their live-object bookkeeping
//!
//! A [`LibraryHandle`] counts the objects that were built by its factories and
//! are still alive. Each such object holds a [`LibraryLease`]; the count only
//! reaches zero once every lease is gone, and a library is never closed before
//! that.

use crate::error::{RegistryError, Result};
use crate::loader::{NativeLibrary, RawSymbol};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An opened shared library
pub struct LibraryHandle {
    path: PathBuf,
    native: Mutex<Option<Box<dyn NativeLibrary>>>,
    live: AtomicUsize,
}

impl LibraryHandle {
    pub(crate) fn new(path: PathBuf, native: Box<dyn NativeLibrary>) -> Self {
        LibraryHandle {
            path,
            native: Mutex::new(Some(native)),
            live: AtomicUsize::new(0),
        }
    }

    /// Resolved path the library was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of objects built from this library that are still alive
    pub fn live_objects(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Whether the native handle is still open
    pub fn is_open(&self) -> bool {
        self.native.lock().is_some()
    }

    pub(crate) fn resolve_symbol(&self, name: &str) -> Result<RawSymbol> {
        let native = self.native.lock();
        match native.as_ref() {
            Some(library) => library.resolve_symbol(name).ok_or_else(|| {
                RegistryError::SymbolNotFound {
                    path: self.path.clone(),
                    symbol: name.to_string(),
                }
            }),
            None => Err(RegistryError::SymbolNotFound {
                path: self.path.clone(),
                symbol: name.to_string(),
            }),
        }
    }

    /// Close the native handle if no objects are alive.
    ///
    /// Closing an already closed handle succeeds.
    pub(crate) fn close(&self) -> Result<()> {
        let mut native = self.native.lock();
        let live = self.live_objects();
        if live > 0 {
            return Err(RegistryError::LibraryStillInUse {
                path: self.path.clone(),
                live,
            });
        }

        if let Some(library) = native.take() {
            if let Err(reason) = library.close() {
                tracing::warn!(
                    path = %self.path.display(),
                    %reason,
                    "Native library close reported an error"
                );
            }
        }
        Ok(())
    }

    pub(crate) fn lease(self: &Arc<Self>) -> LibraryLease {
        self.live.fetch_add(1, Ordering::AcqRel);
        LibraryLease {
            library: Arc::clone(self),
        }
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("live", &self.live_objects())
            .finish()
    }
}

/// Counted reference from a live object to the library that built it
pub(crate) struct LibraryLease {
    library: Arc<LibraryHandle>,
}

impl LibraryLease {
    pub(crate) fn path(&self) -> &Path {
        self.library.path()
    }
}

impl Drop for LibraryLease {
    fn drop(&mut self) {
        self.library.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for LibraryLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LibraryLease").field(&self.library.path).finish()
    }
}
