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
//! # gfactory
//!
//! A runtime factory and plugin registry. Components register object
//! constructors under string keys, either compiled into the host (static
//! factories) or loaded on demand from shared libraries (dynamic factories),
//! and callers create objects by key without knowing the concrete type.
//!
//! ## Features
//!
//! - **Checked creation**: every factory records a [`TypeTag`]; asking for the
//!   wrong type fails with [`RegistryError::TypeMismatch`] instead of an
//!   unchecked cast
//! - **All-or-nothing plugin loads**: a library that fails part way through
//!   registration leaves no trace in the registry
//! - **Lifetime tracking**: objects keep the library that built them loaded,
//!   and teardown refuses to close a library with live objects
//! - **ABI handshake**: plugins report a semantic version that is checked before
//!   any of their code is trusted
//! - **Structured events**: registrations, loads and creations are reported as
//!   [`RegistryEvent`] values and mirrored through `tracing`
//! - **Parallelization**: optional Rayon-backed batch creation
//!
//! ## Example
//!
//! ```rust
//! use gfactory::{FactoryRegistry, RegistryError, TypeTag};
//!
//! trait Shape: Send {
//!     fn sides(&self) -> u32;
//! }
//!
//! struct Triangle;
//!
//! impl Shape for Triangle {
//!     fn sides(&self) -> u32 { 3 }
//! }
//!
//! let registry = FactoryRegistry::new("shapes");
//! registry
//!     .register_factory("triangle", || -> Box<dyn Shape> { Box::new(Triangle) })
//!     .unwrap();
//!
//! let handle = registry
//!     .create_expecting("triangle", &TypeTag::of::<Box<dyn Shape>>())
//!     .unwrap();
//! assert!(handle.type_tag().is::<Box<dyn Shape>>());
//!
//! assert!(matches!(
//!     registry.create_as::<String>("triangle"),
//!     Err(RegistryError::TypeMismatch { .. })
//! ));
//! assert!(matches!(
//!     registry.create("square"),
//!     Err(RegistryError::KeyNotFound { .. })
//! ));
//! ```

#![warn(missing_docs)]

/// Plugin ABI contract and entry point declaration
pub mod abi;

/// Registry configuration and startup options
pub mod config;

/// Error types
pub mod error;

/// Structured registry events
pub mod events;

/// Owning handles to created objects
pub mod handle;

/// Opened libraries and live-object bookkeeping
pub mod library;

/// Library loading backends
pub mod loader;

/// The factory registry
pub mod registry;

/// Runtime type tags
pub mod tag;

pub use abi::{ABI_VERSION, ABI_VERSION_SYMBOL, REGISTER_SYMBOL};
pub use config::{RegistryConfig, StartupOptions};
pub use error::{ErrorKind, RegistryError, Result, TeardownError};
pub use events::{Observer, RegistryEvent};
pub use handle::{Instance, ObjectHandle};
pub use library::LibraryHandle;
pub use loader::{
    DylibBackend, DynamicLibraryLoader, LoaderBackend, MemoryBackend, MemoryLibrary, NativeLibrary,
    RawSymbol,
};
pub use registry::{FactoryRegistry, Registrar, RegistryState};
pub use tag::TypeTag;
