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
//! Owning handles to created objects
//!
//! [`ObjectHandle`] is the type-erased result of a creation call. It can be
//! turned into a typed [`Instance`] with a checked downcast. Both keep the
//! producing library loaded for as long as they live.

use crate::library::LibraryLease;
use crate::tag::TypeTag;
use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;

/// Type-erased owning handle to a created object
///
/// Field order matters: the payload is dropped before the lease so that drop
/// glue living in a plugin runs while the plugin is still loaded.
pub struct ObjectHandle {
    payload: Box<dyn Any + Send>,
    tag: TypeTag,
    key: String,
    lease: Option<LibraryLease>,
}

impl ObjectHandle {
    pub(crate) fn new(
        key: String,
        tag: TypeTag,
        payload: Box<dyn Any + Send>,
        lease: Option<LibraryLease>,
    ) -> Self {
        ObjectHandle {
            payload,
            tag,
            key,
            lease,
        }
    }

    /// Key of the factory that built this object
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Type tag recorded for the factory
    pub fn type_tag(&self) -> &TypeTag {
        &self.tag
    }

    /// Whether the object came from a dynamically loaded factory
    pub fn is_dynamic(&self) -> bool {
        self.lease.is_some()
    }

    /// Path of the library that built this object, if any
    pub fn library_path(&self) -> Option<&Path> {
        self.lease.as_ref().map(LibraryLease::path)
    }

    /// Whether the payload is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Borrow the payload as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Mutably borrow the payload as `T`
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.downcast_mut::<T>()
    }

    /// Convert into a typed [`Instance`]
    ///
    /// Returns the handle unchanged if the payload is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<Instance<T>, ObjectHandle> {
        let ObjectHandle {
            payload,
            tag,
            key,
            lease,
        } = self;

        match payload.downcast::<T>() {
            Ok(value) => Ok(Instance { value, key, lease }),
            Err(payload) => Err(ObjectHandle {
                payload,
                tag,
                key,
                lease,
            }),
        }
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("key", &self.key)
            .field("tag", &self.tag)
            .field("library", &self.library_path())
            .finish()
    }
}

/// Typed owning handle to a created object
///
/// Dereferences to `T`. Like [`ObjectHandle`] it keeps the producing library
/// loaded until dropped, so the value cannot be moved out of it.
pub struct Instance<T> {
    value: Box<T>,
    key: String,
    lease: Option<LibraryLease>,
}

impl<T> Instance<T> {
    /// Key of the factory that built this object
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the object came from a dynamically loaded factory
    pub fn is_dynamic(&self) -> bool {
        self.lease.is_some()
    }

    /// Path of the library that built this object, if any
    pub fn library_path(&self) -> Option<&Path> {
        self.lease.as_ref().map(LibraryLease::path)
    }
}

impl<T> Deref for Instance<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Instance<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("library", &self.library_path())
            .finish()
    }
}
