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
//! Structured registry events
//!
//! Every event is recorded through `tracing` and handed to the observers the
//! registry was built with. Observers receive data, not formatted text, and
//! decide for themselves how to present or route it.

use crate::error::ErrorKind;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Something that happened inside a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A factory became available
    FactoryRegistered {
        /// Factory key
        key: String,
    },
    /// A library was loaded and all of its factories registered
    LibraryLoaded {
        /// Resolved library path
        path: PathBuf,
        /// Keys the library registered, in registration order
        keys: Vec<String>,
    },
    /// A library load was rejected and rolled back
    LibraryLoadFailed {
        /// Requested library path
        path: PathBuf,
        /// Why the load failed
        reason: ErrorKind,
    },
    /// An object was created
    ObjectCreated {
        /// Factory key
        key: String,
    },
    /// An object could not be created
    ObjectCreateFailed {
        /// Factory key
        key: String,
        /// Why creation failed
        reason: ErrorKind,
    },
    /// A library was closed and its factories removed
    LibraryClosed {
        /// Resolved library path
        path: PathBuf,
    },
}

impl RegistryEvent {
    /// Short machine-readable name of the event
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::FactoryRegistered { .. } => "factory_registered",
            RegistryEvent::LibraryLoaded { .. } => "library_loaded",
            RegistryEvent::LibraryLoadFailed { .. } => "library_load_failed",
            RegistryEvent::ObjectCreated { .. } => "object_created",
            RegistryEvent::ObjectCreateFailed { .. } => "object_create_failed",
            RegistryEvent::LibraryClosed { .. } => "library_closed",
        }
    }

    fn trace(&self) {
        let event = self.name();
        match self {
            RegistryEvent::FactoryRegistered { key } => {
                tracing::debug!(event, key = %key, "Factory registered");
            }
            RegistryEvent::LibraryLoaded { path, keys } => {
                tracing::info!(event, path = %path.display(), keys = ?keys, "Library loaded");
            }
            RegistryEvent::LibraryLoadFailed { path, reason } => {
                tracing::warn!(event, path = %path.display(), %reason, "Library load failed");
            }
            RegistryEvent::ObjectCreated { key } => {
                tracing::trace!(event, key = %key, "Object created");
            }
            RegistryEvent::ObjectCreateFailed { key, reason } => {
                tracing::debug!(event, key = %key, %reason, "Object creation failed");
            }
            RegistryEvent::LibraryClosed { path } => {
                tracing::info!(event, path = %path.display(), "Library closed");
            }
        }
    }
}

/// Callback receiving registry events
pub type Observer = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Fixed set of observers, plus the `tracing` mirror
#[derive(Clone, Default)]
pub(crate) struct EventBus {
    observers: Vec<Observer>,
}

impl EventBus {
    pub(crate) fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    pub(crate) fn emit(&self, event: RegistryEvent) {
        event.trace();
        for observer in &self.observers {
            observer(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}
