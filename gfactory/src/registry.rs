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
//! Factory registry
//!
//! This module provides the registry mapping factory keys to constructors:
//! - Static registration via direct API calls
//! - Dynamic registration from shared libraries, all or nothing
//! - Checked creation by key, optionally against an expected type
//! - Live-object tracking so that no library is closed under a live object
//!
//! # Thread Safety
//!
//! The registry is `Send + Sync`. Registration, unregistration, unloading and
//! teardown take the write lock. Creation takes the read lock only for the
//! lookup; the constructor itself runs after the lock is released, so
//! unrelated creations never wait on each other.

use crate::abi;
use crate::config::{RegistryConfig, StartupOptions};
use crate::error::{RegistryError, Result, TeardownError};
use crate::events::{EventBus, RegistryEvent};
use crate::handle::{Instance, ObjectHandle};
use crate::library::LibraryHandle;
use crate::loader::{DylibBackend, DynamicLibraryLoader};
use crate::tag::TypeTag;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Constructor with panics already caught, reporting the panic message
type Creator = Arc<dyn Fn() -> std::result::Result<Box<dyn Any + Send>, String> + Send + Sync>;

/// A registered constructor
struct FactoryEntry {
    tag: TypeTag,
    creator: Creator,
    library: Option<Arc<LibraryHandle>>,
}

impl FactoryEntry {
    fn new<T, F>(tag: TypeTag, creator: F, library: Option<Arc<LibraryHandle>>) -> Self
    where
        T: Any + Send,
        F: Fn() -> T + Send + Sync + 'static,
    {
        // Monomorphized in whichever crate registers the factory, so for a
        // plugin the panic is caught by the plugin's own runtime.
        let creator = move || {
            panic::catch_unwind(AssertUnwindSafe(&creator))
                .map(|value| Box::new(value) as Box<dyn Any + Send>)
                .map_err(|payload| abi::panic_message(payload.as_ref()))
        };

        FactoryEntry {
            tag,
            creator: Arc::new(creator),
            library,
        }
    }
}

/// Lifecycle of a [`FactoryRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    /// Nothing has been registered yet
    Uninitialized,
    /// At least one registration succeeded
    Ready,
    /// [`FactoryRegistry::close`] has been called
    Closed,
}

struct LoadedLibrary {
    handle: Arc<LibraryHandle>,
    requested: PathBuf,
    keys: Vec<String>,
}

struct Inner {
    state: RegistryState,
    entries: IndexMap<String, Arc<FactoryEntry>>,
    libraries: IndexMap<PathBuf, LoadedLibrary>,
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.state == RegistryState::Closed {
            return Err(RegistryError::RegistryClosed);
        }
        Ok(())
    }

    fn mark_ready(&mut self) {
        if self.state == RegistryState::Uninitialized {
            self.state = RegistryState::Ready;
        }
    }

    /// Resolved path of a loaded library, looked up by either the resolved or
    /// the originally requested path
    fn find_library(&self, path: &Path) -> Option<PathBuf> {
        if self.libraries.contains_key(path) {
            return Some(path.to_path_buf());
        }
        self.libraries
            .iter()
            .find(|(_, loaded)| loaded.requested == path)
            .map(|(resolved, _)| resolved.clone())
    }
}

fn insert_entry(
    entries: &mut IndexMap<String, Arc<FactoryEntry>>,
    key: String,
    entry: FactoryEntry,
) -> Result<()> {
    if key.is_empty() {
        return Err(RegistryError::InvalidKey);
    }
    if entries.contains_key(&key) {
        return Err(RegistryError::DuplicateKey { key });
    }
    entries.insert(key, Arc::new(entry));
    Ok(())
}

/// Registration interface handed to a library's registration entry point
///
/// Every factory registered through it belongs to the library being loaded.
/// The first failed registration dooms the whole load, even if the entry
/// point ignores the error and returns `Ok`.
pub struct Registrar<'a> {
    entries: &'a mut IndexMap<String, Arc<FactoryEntry>>,
    library: &'a Arc<LibraryHandle>,
    added: Vec<String>,
    conflict: Option<RegistryError>,
}

impl<'a> Registrar<'a> {
    fn new(
        entries: &'a mut IndexMap<String, Arc<FactoryEntry>>,
        library: &'a Arc<LibraryHandle>,
    ) -> Self {
        Registrar {
            entries,
            library,
            added: Vec::new(),
            conflict: None,
        }
    }

    /// Register a factory producing `T` under `key`
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateKey`] if the key is taken,
    /// [`RegistryError::InvalidKey`] if it is empty.
    pub fn register<T, F>(&mut self, key: impl Into<String>, creator: F) -> Result<()>
    where
        T: Any + Send,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = key.into();
        let entry = FactoryEntry::new(
            TypeTag::of::<T>().into_owned(),
            creator,
            Some(Arc::clone(self.library)),
        );

        match insert_entry(self.entries, key.clone(), entry) {
            Ok(()) => {
                self.added.push(key);
                Ok(())
            }
            Err(e) => {
                if self.conflict.is_none() {
                    self.conflict = Some(e.clone());
                }
                Err(e)
            }
        }
    }

    /// Path of the library being loaded
    pub fn library_path(&self) -> &Path {
        self.library.path()
    }

    /// Keys registered so far by this library
    pub fn registered_keys(&self) -> &[String] {
        &self.added
    }

    fn finish(self) -> (Vec<String>, Option<RegistryError>) {
        (self.added, self.conflict)
    }
}

impl fmt::Debug for Registrar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("library", &self.library.path())
            .field("added", &self.added)
            .finish()
    }
}

/// Registry of object factories, static and dynamic
///
/// # Example
///
/// ```rust
/// use gfactory::FactoryRegistry;
///
/// trait Shape: Send {
///     fn area(&self) -> f64;
/// }
///
/// struct Triangle;
///
/// impl Shape for Triangle {
///     fn area(&self) -> f64 { 6.0 }
/// }
///
/// let registry = FactoryRegistry::new("shapes");
/// registry
///     .register_factory("triangle", || -> Box<dyn Shape> { Box::new(Triangle) })
///     .unwrap();
///
/// let shape = registry.create_as::<Box<dyn Shape>>("triangle").unwrap();
/// assert_eq!(shape.area(), 6.0);
/// ```
pub struct FactoryRegistry {
    name: String,
    config: RegistryConfig,
    loader: DynamicLibraryLoader,
    events: EventBus,
    inner: RwLock<Inner>,
}

impl FactoryRegistry {
    /// Create a registry with the default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, RegistryConfig::default())
    }

    /// Create a registry with the given configuration
    ///
    /// Libraries are opened with the platform loader, searching
    /// `config.search_paths`.
    pub fn with_config(name: impl Into<String>, config: RegistryConfig) -> Self {
        let loader = DynamicLibraryLoader::new(DylibBackend::new(config.search_paths.clone()));
        let name = name.into();
        tracing::debug!(registry = %name, abi = %config.abi_version, "Creating factory registry");

        FactoryRegistry {
            name,
            config,
            loader,
            events: EventBus::default(),
            inner: RwLock::new(Inner {
                state: RegistryState::Uninitialized,
                entries: IndexMap::new(),
                libraries: IndexMap::new(),
            }),
        }
    }

    /// Replace the library loader
    pub fn with_loader(mut self, loader: DynamicLibraryLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Add an observer receiving every [`RegistryEvent`]
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&RegistryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(Arc::new(observer));
        self
    }

    /// Register a static factory producing `T` under `key`
    ///
    /// Factories for trait objects should produce the boxed trait object,
    /// e.g. `Box<dyn Shape>`, so callers can ask for the interface.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateKey`] if the key is taken; unregister first to
    ///   replace a factory
    /// - [`RegistryError::InvalidKey`] if the key is empty
    /// - [`RegistryError::RegistryClosed`] after [`close`](Self::close)
    pub fn register_factory<T, F>(&self, key: impl Into<String>, creator: F) -> Result<()>
    where
        T: Any + Send,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let key = key.into();
        {
            let mut inner = self.inner.write();
            inner.ensure_open()?;
            let entry = FactoryEntry::new(TypeTag::of::<T>(), creator, None);
            insert_entry(&mut inner.entries, key.clone(), entry)?;
            inner.mark_ready();
        }

        self.events.emit(RegistryEvent::FactoryRegistered { key });
        Ok(())
    }

    /// Load a shared library and register its factories
    ///
    /// The library's ABI version is checked before its registration entry
    /// point is even resolved. The load is all or nothing: if the entry point
    /// fails, panics, or any of its registrations is rejected, every factory it
    /// added is removed and the library is closed before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`RegistryError::LibraryNotFound`], [`RegistryError::LibraryAlreadyLoaded`],
    /// [`RegistryError::AbiMismatch`], [`RegistryError::SymbolNotFound`],
    /// [`RegistryError::DuplicateKey`], [`RegistryError::InvalidKey`],
    /// [`RegistryError::PluginFailed`] or [`RegistryError::RegistryClosed`].
    pub fn register_dynamic_library(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match self.load_library(path) {
            Ok((resolved, keys)) => {
                for key in &keys {
                    self.events.emit(RegistryEvent::FactoryRegistered { key: key.clone() });
                }
                self.events.emit(RegistryEvent::LibraryLoaded {
                    path: resolved,
                    keys,
                });
                Ok(())
            }
            Err(e) => {
                self.events.emit(RegistryEvent::LibraryLoadFailed {
                    path: path.to_path_buf(),
                    reason: e.kind(),
                });
                Err(e)
            }
        }
    }

    fn load_library(&self, path: &Path) -> Result<(PathBuf, Vec<String>)> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.ensure_open()?;

        let handle = Arc::new(self.loader.open(path)?);
        if inner.libraries.contains_key(handle.path()) {
            self.discard(&handle);
            return Err(RegistryError::LibraryAlreadyLoaded {
                path: handle.path().to_path_buf(),
            });
        }

        let register = match self
            .loader
            .check_abi(&handle, &self.config.abi_version)
            .and_then(|_| self.loader.registration_entry(&handle))
        {
            Ok(register) => register,
            Err(e) => {
                self.discard(&handle);
                return Err(e);
            }
        };

        let mut registrar = Registrar::new(&mut inner.entries, &handle);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| register(&mut registrar)));
        let (added, conflict) = registrar.finish();

        let outcome = match (outcome, conflict) {
            (_, Some(conflict)) => Err(conflict),
            (Ok(result), None) => result,
            (Err(payload), None) => Err(RegistryError::PluginFailed(format!(
                "registration panicked: {}",
                abi::panic_message(payload.as_ref())
            ))),
        };

        if let Err(e) = outcome {
            tracing::debug!(
                path = %handle.path().display(),
                rolled_back = added.len(),
                "Rolling back library registration"
            );
            for key in &added {
                inner.entries.shift_remove(key);
            }
            self.discard(&handle);
            return Err(e);
        }

        let resolved = handle.path().to_path_buf();
        inner.libraries.insert(
            resolved.clone(),
            LoadedLibrary {
                handle,
                requested: path.to_path_buf(),
                keys: added.clone(),
            },
        );
        inner.mark_ready();
        Ok((resolved, added))
    }

    /// Close a library that never made it into the registry
    fn discard(&self, handle: &LibraryHandle) {
        if let Err(e) = self.loader.close(handle) {
            tracing::warn!(registry = %self.name, error = %e, "Failed to close rejected library");
        }
    }

    /// Create an object by key
    ///
    /// # Errors
    ///
    /// [`RegistryError::KeyNotFound`] if nothing is registered under `key`; the
    /// registry's constructors are not touched in that case.
    /// [`RegistryError::CreationFailed`] if the constructor panics.
    pub fn create(&self, key: &str) -> Result<ObjectHandle> {
        self.create_checked(key, None)
    }

    /// Create an object by key, checking the factory's type first
    ///
    /// # Errors
    ///
    /// As [`create`](Self::create), plus [`RegistryError::TypeMismatch`] if the
    /// factory does not produce `expected`. The constructor is not invoked on
    /// a mismatch.
    pub fn create_expecting(&self, key: &str, expected: &TypeTag) -> Result<ObjectHandle> {
        self.create_checked(key, Some(expected))
    }

    /// Create an object by key and downcast it to `T`
    ///
    /// # Errors
    ///
    /// As [`create_expecting`](Self::create_expecting) with the tag of `T`.
    pub fn create_as<T: Any>(&self, key: &str) -> Result<Instance<T>> {
        let expected = TypeTag::of::<T>();
        self.create_checked(key, Some(&expected))?
            .downcast::<T>()
            .map_err(|handle| RegistryError::TypeMismatch {
                key: key.to_string(),
                expected: expected.name().to_string(),
                actual: handle.type_tag().name().to_string(),
            })
    }

    fn create_checked(&self, key: &str, expected: Option<&TypeTag>) -> Result<ObjectHandle> {
        let result = self.construct(key, expected);
        let event = match &result {
            Ok(_) => RegistryEvent::ObjectCreated {
                key: key.to_string(),
            },
            Err(e) => RegistryEvent::ObjectCreateFailed {
                key: key.to_string(),
                reason: e.kind(),
            },
        };
        self.events.emit(event);
        result
    }

    fn construct(&self, key: &str, expected: Option<&TypeTag>) -> Result<ObjectHandle> {
        // The lease is taken under the read lock so that teardown, which needs
        // the write lock, sees it before deciding to close the library.
        let (entry, lease) = {
            let inner = self.inner.read();
            inner.ensure_open()?;
            let entry = inner
                .entries
                .get(key)
                .ok_or_else(|| RegistryError::KeyNotFound {
                    key: key.to_string(),
                })?;

            if let Some(expected) = expected {
                if *expected != entry.tag {
                    return Err(RegistryError::TypeMismatch {
                        key: key.to_string(),
                        expected: expected.name().to_string(),
                        actual: entry.tag.name().to_string(),
                    });
                }
            }

            let lease = entry.library.as_ref().map(|library| library.lease());
            (Arc::clone(entry), lease)
        };

        // On failure the lease is released here, after the creator has returned
        let payload = (entry.creator)().map_err(|reason| RegistryError::CreationFailed {
            key: key.to_string(),
            reason: format!("factory panicked: {reason}"),
        })?;
        let tag = entry.tag.clone();
        drop(entry);

        Ok(ObjectHandle::new(key.to_string(), tag, payload, lease))
    }

    /// Create one object per key, in parallel when the `parallel` feature is
    /// enabled
    ///
    /// Results are returned in the order of `keys`.
    pub fn create_many<S>(&self, keys: &[S]) -> Vec<Result<ObjectHandle>>
    where
        S: AsRef<str> + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            keys.par_iter().map(|key| self.create(key.as_ref())).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            keys.iter().map(|key| self.create(key.as_ref())).collect()
        }
    }

    /// Load the configured libraries, then create the configured factories
    ///
    /// Stops at the first error. Libraries loaded before the failure stay
    /// loaded. Handles are returned in configuration order.
    pub fn bootstrap(&self, options: &StartupOptions) -> Result<Vec<ObjectHandle>> {
        for library in &options.libraries {
            self.register_dynamic_library(library)?;
        }
        self.create_many(&options.factories).into_iter().collect()
    }

    /// Remove a static factory
    ///
    /// # Errors
    ///
    /// [`RegistryError::KeyNotFound`] if absent, [`RegistryError::LibraryOwned`]
    /// if the factory came from a library; those are only removed by
    /// [`unload_library`](Self::unload_library).
    pub fn unregister(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;

        match inner.entries.get(key) {
            None => {
                return Err(RegistryError::KeyNotFound {
                    key: key.to_string(),
                })
            }
            Some(entry) => {
                if let Some(library) = &entry.library {
                    return Err(RegistryError::LibraryOwned {
                        key: key.to_string(),
                        path: library.path().to_path_buf(),
                    });
                }
            }
        }

        inner.entries.shift_remove(key);
        tracing::debug!(registry = %self.name, key, "Factory unregistered");
        Ok(())
    }

    /// Remove a library's factories and close it
    ///
    /// `path` may be the path originally requested or the resolved one.
    ///
    /// # Errors
    ///
    /// [`RegistryError::LibraryNotFound`] if the library is not loaded by this
    /// registry, [`RegistryError::LibraryStillInUse`] if objects it built are
    /// alive; nothing changes in that case.
    pub fn unload_library(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let resolved = {
            let mut inner = self.inner.write();
            let resolved =
                inner
                    .find_library(path)
                    .ok_or_else(|| RegistryError::LibraryNotFound {
                        path: path.to_path_buf(),
                        reason: "not loaded by this registry".to_string(),
                    })?;
            self.unload_locked(&mut inner, &resolved)?;
            resolved
        };

        self.events
            .emit(RegistryEvent::LibraryClosed { path: resolved });
        Ok(())
    }

    fn unload_locked(&self, inner: &mut Inner, resolved: &Path) -> Result<()> {
        let Some(loaded) = inner.libraries.get(resolved) else {
            return Ok(());
        };

        let live = loaded.handle.live_objects();
        if live > 0 {
            return Err(RegistryError::LibraryStillInUse {
                path: resolved.to_path_buf(),
                live,
            });
        }

        if let Some(loaded) = inner.libraries.shift_remove(resolved) {
            // Entries hold closures whose code lives in the library, so they
            // must be gone before it is closed.
            for key in &loaded.keys {
                inner.entries.shift_remove(key);
            }
            self.loader.close(&loaded.handle)?;
        }
        Ok(())
    }

    /// Tear the registry down
    ///
    /// Drops every static factory and closes every library without live
    /// objects. Libraries that still have live objects are left open with
    /// their factories in place, and reported. Calling `close` again retries
    /// them.
    ///
    /// # Errors
    ///
    /// A [`TeardownError`] carrying one [`RegistryError::LibraryStillInUse`] per
    /// library left open.
    pub fn close(&self) -> std::result::Result<(), TeardownError> {
        let mut closed = Vec::new();
        let mut failures = Vec::new();
        {
            let mut inner = self.inner.write();
            inner.state = RegistryState::Closed;
            inner.entries.retain(|_, entry| entry.library.is_some());

            let paths: Vec<PathBuf> = inner.libraries.keys().cloned().collect();
            for path in paths {
                match self.unload_locked(&mut inner, &path) {
                    Ok(()) => closed.push(path),
                    Err(e) => {
                        tracing::warn!(
                            registry = %self.name,
                            error = %e,
                            "Library left open at teardown"
                        );
                        failures.push(e);
                    }
                }
            }
        }

        for path in closed {
            self.events.emit(RegistryEvent::LibraryClosed { path });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }

    /// Registry name, used in log output
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the registry was created with
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> RegistryState {
        self.inner.read().state
    }

    /// Registered keys, in registration order
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().entries.keys().cloned().collect()
    }

    /// Whether a factory is registered under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Whether no factories are registered
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Type tag recorded for `key`
    pub fn type_tag(&self, key: &str) -> Option<TypeTag> {
        self.inner.read().entries.get(key).map(|entry| entry.tag.clone())
    }

    /// Whether `key` is registered and belongs to a library
    pub fn is_dynamic(&self, key: &str) -> bool {
        self.inner
            .read()
            .entries
            .get(key)
            .is_some_and(|entry| entry.library.is_some())
    }

    /// Path of the library owning `key`, or `None` for static factories and
    /// unknown keys
    pub fn library_of(&self, key: &str) -> Option<PathBuf> {
        self.inner
            .read()
            .entries
            .get(key)
            .and_then(|entry| entry.library.as_ref())
            .map(|library| library.path().to_path_buf())
    }

    /// Resolved paths of loaded libraries, in load order
    pub fn libraries(&self) -> Vec<PathBuf> {
        self.inner.read().libraries.keys().cloned().collect()
    }

    /// Live object count of a loaded library
    pub fn live_objects(&self, path: impl AsRef<Path>) -> Option<usize> {
        let inner = self.inner.read();
        let resolved = inner.find_library(path.as_ref())?;
        inner
            .libraries
            .get(&resolved)
            .map(|loaded| loaded.handle.live_objects())
    }
}

impl Drop for FactoryRegistry {
    fn drop(&mut self) {
        let pending = {
            let inner = self.inner.read();
            inner.state != RegistryState::Closed || !inner.libraries.is_empty()
        };
        if pending {
            if let Err(e) = self.close() {
                // Libraries left open close themselves once their last object
                // is dropped.
                tracing::warn!(
                    registry = %self.name,
                    error = %e,
                    "Registry dropped with live plugin objects"
                );
            }
        }
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("FactoryRegistry")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("keys", &inner.entries.keys().collect::<Vec<_>>())
            .field("libraries", &inner.libraries.keys().collect::<Vec<_>>())
            .field("loader", &self.loader)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Shape: Send {
        fn area(&self) -> f64;
    }

    struct Triangle {
        base: f64,
        height: f64,
    }

    impl Shape for Triangle {
        fn area(&self) -> f64 {
            0.5 * self.base * self.height
        }
    }

    struct Square(f64);

    impl Shape for Square {
        fn area(&self) -> f64 {
            self.0 * self.0
        }
    }

    fn triangle() -> Box<dyn Shape> {
        Box::new(Triangle {
            base: 3.0,
            height: 4.0,
        })
    }

    #[test]
    fn test_registry_creation() {
        let registry = FactoryRegistry::new("test");
        assert_eq!(registry.name(), "test");
        assert_eq!(registry.state(), RegistryState::Uninitialized);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registration_makes_ready() {
        let registry = FactoryRegistry::new("test");
        registry.register_factory("triangle", triangle).unwrap();
        assert_eq!(registry.state(), RegistryState::Ready);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("triangle"));
        assert!(!registry.contains("Triangle"));
        assert!(registry.library_of("triangle").is_none());
        assert!(!registry.is_dynamic("triangle"));
        assert!(!registry.is_dynamic("square"));
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = FactoryRegistry::new("test");
        registry.register_factory("triangle", triangle).unwrap();

        let result = registry.register_factory("triangle", || 42_u32);
        assert!(
            matches!(result, Err(RegistryError::DuplicateKey { ref key }) if key == "triangle")
        );
        assert_eq!(registry.keys(), vec!["triangle"]);
        assert!(registry.type_tag("triangle").unwrap().is::<Box<dyn Shape>>());
    }

    #[test]
    fn test_empty_key_rejected() {
        let registry = FactoryRegistry::new("test");
        let result = registry.register_factory("", triangle);
        assert!(matches!(result, Err(RegistryError::InvalidKey)));
        assert_eq!(registry.state(), RegistryState::Uninitialized);
    }

    #[test]
    fn test_create_and_downcast() {
        let registry = FactoryRegistry::new("test");
        registry.register_factory("triangle", triangle).unwrap();
        registry
            .register_factory("square", || -> Box<dyn Shape> { Box::new(Square(2.0)) })
            .unwrap();

        let handle = registry.create("square").unwrap();
        assert_eq!(handle.key(), "square");
        assert!(!handle.is_dynamic());
        assert_eq!(handle.downcast_ref::<Box<dyn Shape>>().unwrap().area(), 4.0);

        let shape = registry.create_as::<Box<dyn Shape>>("triangle").unwrap();
        assert_eq!(shape.area(), 6.0);
    }

    #[test]
    fn test_missing_key_never_constructs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = FactoryRegistry::new("test");
        let counter = Arc::clone(&calls);
        registry
            .register_factory("triangle", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                triangle()
            })
            .unwrap();

        let result = registry.create("square");
        assert!(matches!(result, Err(RegistryError::KeyNotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_type_mismatch_never_constructs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = FactoryRegistry::new("test");
        let counter = Arc::clone(&calls);
        registry
            .register_factory("triangle", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                triangle()
            })
            .unwrap();

        let result = registry.create_as::<String>("triangle");
        match result {
            Err(RegistryError::TypeMismatch {
                key,
                expected,
                actual,
            }) => {
                assert_eq!(key, "triangle");
                assert!(expected.contains("String"));
                assert!(actual.contains("Shape"));
            }
            other => panic!(
                "expected a type mismatch, got {:?}",
                other.map(|i| i.key().to_string())
            ),
        }

        let result = registry.create_expecting("triangle", &TypeTag::of::<u8>());
        assert!(matches!(result, Err(RegistryError::TypeMismatch { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry
            .create_expecting("triangle", &TypeTag::of::<Box<dyn Shape>>())
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_factory_reports_failure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let registry = FactoryRegistry::new("test")
            .with_observer(move |event: &RegistryEvent| sink.lock().push(event.clone()));
        registry
            .register_factory("square", || -> Box<dyn Shape> { panic!("negative side") })
            .unwrap();

        match registry.create("square") {
            Err(RegistryError::CreationFailed { key, reason }) => {
                assert_eq!(key, "square");
                assert_eq!(reason, "factory panicked: negative side");
            }
            other => panic!("unexpected result: {:?}", other.map(|h| h.key().to_string())),
        }
        assert_eq!(
            seen.lock().last(),
            Some(&RegistryEvent::ObjectCreateFailed {
                key: "square".to_string(),
                reason: crate::error::ErrorKind::CreationFailed,
            })
        );

        // The registry keeps working
        registry.register_factory("triangle", triangle).unwrap();
        assert!(registry.create("triangle").is_ok());
    }

    #[test]
    fn test_unregister() {
        let registry = FactoryRegistry::new("test");
        registry.register_factory("triangle", triangle).unwrap();

        registry.unregister("triangle").unwrap();
        assert!(!registry.contains("triangle"));

        let result = registry.unregister("triangle");
        assert!(matches!(result, Err(RegistryError::KeyNotFound { .. })));

        // Replacement goes through unregister
        registry.register_factory("triangle", || 1_u8).unwrap();
        assert!(registry.type_tag("triangle").unwrap().is::<u8>());
    }

    #[test]
    fn test_keys_in_insertion_order() {
        let registry = FactoryRegistry::new("test");
        for key in ["zeta", "alpha", "mu", "beta"] {
            registry.register_factory(key, || 0_u8).unwrap();
        }
        registry.unregister("mu").unwrap();
        registry.register_factory("mu", || 0_u8).unwrap();
        assert_eq!(registry.keys(), vec!["zeta", "alpha", "beta", "mu"]);
    }

    #[test]
    fn test_closed_registry_rejects_work() {
        let registry = FactoryRegistry::new("test");
        registry.register_factory("triangle", triangle).unwrap();
        registry.close().unwrap();

        assert_eq!(registry.state(), RegistryState::Closed);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.create("triangle"),
            Err(RegistryError::RegistryClosed)
        ));
        assert!(matches!(
            registry.register_factory("square", || 0_u8),
            Err(RegistryError::RegistryClosed)
        ));

        // Closing again is harmless
        registry.close().unwrap();
    }

    #[test]
    fn test_events_emitted() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let registry = FactoryRegistry::new("test")
            .with_observer(move |event: &RegistryEvent| sink.lock().push(event.clone()));

        registry.register_factory("triangle", triangle).unwrap();
        let _shape = registry.create("triangle").unwrap();
        let _ = registry.create("square");

        let events = seen.lock();
        assert_eq!(
            *events,
            vec![
                RegistryEvent::FactoryRegistered {
                    key: "triangle".to_string()
                },
                RegistryEvent::ObjectCreated {
                    key: "triangle".to_string()
                },
                RegistryEvent::ObjectCreateFailed {
                    key: "square".to_string(),
                    reason: crate::error::ErrorKind::KeyNotFound,
                },
            ]
        );
    }

    #[test]
    fn test_create_many_preserves_order() {
        let registry = FactoryRegistry::new("test");
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            registry.register_factory(*key, move || i).unwrap();
        }

        let results = registry.create_many(&["d", "a", "missing", "c"]);
        assert_eq!(results.len(), 4);
        assert_eq!(*results[0].as_ref().unwrap().downcast_ref::<usize>().unwrap(), 3);
        assert_eq!(*results[1].as_ref().unwrap().downcast_ref::<usize>().unwrap(), 0);
        assert!(matches!(results[2], Err(RegistryError::KeyNotFound { .. })));
        assert_eq!(*results[3].as_ref().unwrap().downcast_ref::<usize>().unwrap(), 2);
    }

    #[test]
    fn test_bootstrap_static_factories() {
        let registry = FactoryRegistry::new("test");
        registry.register_factory("triangle", triangle).unwrap();
        registry
            .register_factory("square", || -> Box<dyn Shape> { Box::new(Square(3.0)) })
            .unwrap();

        let options = StartupOptions::from_pairs([("factories", "square,triangle")]);
        let handles = registry.bootstrap(&options).unwrap();
        let keys: Vec<&str> = handles.iter().map(ObjectHandle::key).collect();
        assert_eq!(keys, vec!["square", "triangle"]);

        let options = StartupOptions::from_pairs([("factories", "triangle,circle")]);
        assert!(matches!(
            registry.bootstrap(&options),
            Err(RegistryError::KeyNotFound { .. })
        ));
    }
}
