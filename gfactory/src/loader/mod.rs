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
//! Dynamic library loading
//!
//! [`DynamicLibraryLoader`] is the only part of the crate that deals with
//! opening libraries and resolving symbols. The actual work is delegated to a
//! [`LoaderBackend`]:
//!
//! - [`DylibBackend`] uses the platform loader through `libloading`
//! - [`MemoryBackend`] serves in-process symbol tables, for plugin bundles that
//!   are linked statically and for tests

mod dylib;
mod memory;

pub use dylib::DylibBackend;
pub use memory::{MemoryBackend, MemoryLibrary};

use crate::abi::{
    self, AbiVersionFn, RegisterFn, ABI_VERSION, ABI_VERSION_SYMBOL, REGISTER_SYMBOL,
};
use crate::error::{RegistryError, Result};
use crate::library::LibraryHandle;
use semver::Version;
use std::ffi::CStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Address of a symbol exported by a library
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RawSymbol(*const ());

// SAFETY: a RawSymbol is a code address that is only ever called, never read
// or written through, and the registry keeps the library mapped while it is in
// use.
unsafe impl Send for RawSymbol {}
// SAFETY: see above
unsafe impl Sync for RawSymbol {}

impl RawSymbol {
    /// Wrap a raw address, rejecting null
    pub fn from_ptr(ptr: *const ()) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(RawSymbol(ptr))
        }
    }

    /// Symbol for a version-query function
    pub fn from_abi_version_fn(f: AbiVersionFn) -> Self {
        RawSymbol(f as *const ())
    }

    /// Symbol for a registration function
    pub fn from_register_fn(f: RegisterFn) -> Self {
        RawSymbol(f as *const ())
    }

    /// The raw address
    pub fn as_ptr(self) -> *const () {
        self.0
    }

    /// # Safety
    ///
    /// The symbol must be a function with the [`AbiVersionFn`] signature.
    unsafe fn into_abi_version_fn(self) -> AbiVersionFn {
        std::mem::transmute::<*const (), AbiVersionFn>(self.0)
    }

    /// # Safety
    ///
    /// The symbol must be a function with the [`RegisterFn`] signature.
    unsafe fn into_register_fn(self) -> RegisterFn {
        std::mem::transmute::<*const (), RegisterFn>(self.0)
    }
}

impl fmt::Debug for RawSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawSymbol({:p})", self.0)
    }
}

/// A library opened by a [`LoaderBackend`]
pub trait NativeLibrary: Send + Sync {
    /// Look up an exported symbol by name
    fn resolve_symbol(&self, name: &str) -> Option<RawSymbol>;

    /// Release the library
    fn close(self: Box<Self>) -> std::result::Result<(), String>;
}

/// Platform-specific library opening
pub trait LoaderBackend: Send + Sync + fmt::Debug {
    /// Open the library at `path`, returning the path it was actually opened
    /// from together with the native handle
    fn open(&self, path: &Path) -> Result<(PathBuf, Box<dyn NativeLibrary>)>;
}

/// Opens libraries, resolves their entry points and validates their ABI
#[derive(Clone)]
pub struct DynamicLibraryLoader {
    backend: Arc<dyn LoaderBackend>,
}

impl DynamicLibraryLoader {
    /// Create a loader over the given backend
    pub fn new(backend: impl LoaderBackend + 'static) -> Self {
        DynamicLibraryLoader {
            backend: Arc::new(backend),
        }
    }

    /// Create a loader over the platform loader, searching `search_paths` for
    /// libraries that are not found as given
    pub fn system(search_paths: Vec<PathBuf>) -> Self {
        Self::new(DylibBackend::new(search_paths))
    }

    /// Open a library
    ///
    /// # Errors
    ///
    /// [`RegistryError::LibraryNotFound`] if the backend can neither locate nor
    /// open the file.
    pub fn open(&self, path: &Path) -> Result<LibraryHandle> {
        let (resolved, native) = self.backend.open(path)?;
        tracing::debug!(
            requested = %path.display(),
            resolved = %resolved.display(),
            "Opened library"
        );
        Ok(LibraryHandle::new(resolved, native))
    }

    /// Resolve an exported symbol
    ///
    /// # Errors
    ///
    /// [`RegistryError::SymbolNotFound`] if the symbol is missing or the handle
    /// has already been closed.
    pub fn resolve_symbol(&self, handle: &LibraryHandle, name: &str) -> Result<RawSymbol> {
        handle.resolve_symbol(name)
    }

    /// Close a library
    ///
    /// # Errors
    ///
    /// [`RegistryError::LibraryStillInUse`] if objects built by the library are
    /// still alive. The handle stays open in that case.
    pub fn close(&self, handle: &LibraryHandle) -> Result<()> {
        handle.close()?;
        tracing::debug!(path = %handle.path().display(), "Closed library");
        Ok(())
    }

    /// Query the ABI version a library was built against
    ///
    /// # Errors
    ///
    /// [`RegistryError::SymbolNotFound`] if the version function is missing,
    /// [`RegistryError::AbiMismatch`] if it returns something that is not a
    /// semantic version.
    pub fn abi_version(&self, handle: &LibraryHandle) -> Result<Version> {
        let symbol = self.resolve_symbol(handle, ABI_VERSION_SYMBOL)?;
        let mismatch = |found: String| RegistryError::AbiMismatch {
            path: handle.path().to_path_buf(),
            found,
            expected: ABI_VERSION.to_string(),
        };

        // SAFETY: the ABI contract fixes the signature of this symbol, and the
        // handle keeps the library mapped for the duration of the call.
        let raw = unsafe { (symbol.into_abi_version_fn())() };
        if raw.is_null() {
            return Err(mismatch("<null>".to_string()));
        }

        // SAFETY: the ABI contract requires a NUL-terminated string with static
        // lifetime inside the library; it is copied out before returning.
        let reported = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
        Version::parse(reported.trim()).map_err(|_| mismatch(reported))
    }

    /// Query the ABI version and check it against `expected`
    ///
    /// # Errors
    ///
    /// As [`abi_version`](Self::abi_version), plus
    /// [`RegistryError::AbiMismatch`] if the version is incompatible.
    pub fn check_abi(&self, handle: &LibraryHandle, expected: &Version) -> Result<Version> {
        let found = self.abi_version(handle)?;
        if !abi::is_version_compatible(&found, expected) {
            return Err(RegistryError::AbiMismatch {
                path: handle.path().to_path_buf(),
                found: found.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(found)
    }

    /// Resolve the registration entry point
    ///
    /// # Errors
    ///
    /// [`RegistryError::SymbolNotFound`] if the library does not export it.
    pub fn registration_entry(&self, handle: &LibraryHandle) -> Result<RegisterFn> {
        let symbol = self.resolve_symbol(handle, REGISTER_SYMBOL)?;
        // SAFETY: the ABI contract fixes the signature of this symbol, and the
        // version handshake has confirmed both sides agree on it.
        Ok(unsafe { symbol.into_register_fn() })
    }
}

impl Default for DynamicLibraryLoader {
    fn default() -> Self {
        Self::system(Vec::new())
    }
}

impl fmt::Debug for DynamicLibraryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibraryLoader")
            .field("backend", &self.backend)
            .finish()
    }
}
