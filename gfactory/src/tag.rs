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
//! Runtime type tags
//!
//! A [`TypeTag`] names the concrete type a factory produces. Factories that
//! hand out trait objects register the boxed trait object itself, e.g.
//! `Box<dyn Shape>`, so that callers ask for the interface rather than the
//! implementation.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Runtime identity of a factory's product type
///
/// Equality and hashing only look at the [`TypeId`]; the name is carried for
/// diagnostics.
#[derive(Clone)]
pub struct TypeTag {
    id: TypeId,
    name: Cow<'static, str>,
}

impl TypeTag {
    /// Tag for `T`
    pub fn of<T: Any>() -> Self {
        TypeTag {
            id: TypeId::of::<T>(),
            name: Cow::Borrowed(std::any::type_name::<T>()),
        }
    }

    /// The underlying type id
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Readable type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this tag denotes `T`
    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// Copy the name out of static storage.
    ///
    /// Tags built inside a plugin borrow the plugin's read-only data, which
    /// disappears when the library is closed.
    pub(crate) fn into_owned(self) -> Self {
        TypeTag {
            id: self.id,
            name: Cow::Owned(self.name.into_owned()),
        }
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeTag").field(&self.name).finish()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
