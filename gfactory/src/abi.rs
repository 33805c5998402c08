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
//! Plugin ABI contract
//!
//! Every dynamic plugin exports two symbols:
//!
//! - [`ABI_VERSION_SYMBOL`]: an `extern "C" fn() -> *const c_char` returning a
//!   NUL-terminated semantic version string
//! - [`REGISTER_SYMBOL`]: a [`RegisterFn`] that adds the plugin's factories
//!   through the [`Registrar`] it is given
//!
//! The host calls the version function first and refuses the library if the
//! reported version is incompatible with its own; the registration function is
//! never resolved for a rejected library.
//!
//! Use [`declare_plugin!`](crate::declare_plugin) to export both symbols:
//!
//! ```rust,ignore
//! use gfactory::{declare_plugin, Registrar, RegistryError};
//!
//! fn register(registrar: &mut Registrar<'_>) -> Result<(), RegistryError> {
//!     registrar.register("tesla", || -> Box<dyn Car> { Box::new(Tesla::default()) })
//! }
//!
//! declare_plugin!(register);
//! ```
//!
//! Host and plugin must be built with the same toolchain and the same
//! `gfactory` release; the version handshake catches the latter.
//!
//! # Panics across the library boundary
//!
//! A `cdylib` carries its own copy of the standard library, and a panic that
//! unwinds out of plugin code into the host aborts the process. The exported
//! registration function catches panics on the plugin side and reports them
//! as [`RegistryError::PluginFailed`]. Constructors registered through a
//! [`Registrar`] do the same at creation time, yielding
//! [`RegistryError::CreationFailed`]. Panics in the `Drop` impls of
//! plugin-built objects are not caught and still abort.

use crate::error::RegistryError;
use crate::registry::Registrar;
use semver::Version;
use std::any::Any;
use std::os::raw::c_char;

/// Version of the plugin ABI
///
/// Format: MAJOR.MINOR.PATCH following semantic versioning.
pub const ABI_VERSION: &str = "0.2.0";

/// [`ABI_VERSION`] with a trailing NUL, as returned by plugin version functions
pub const ABI_VERSION_NUL: &[u8] = b"0.2.0\0";

/// Name of the exported version-query function
pub const ABI_VERSION_SYMBOL: &str = "gfactory_abi_version";

/// Name of the exported registration function
pub const REGISTER_SYMBOL: &str = "gfactory_register";

/// Signature of the exported version-query function
pub type AbiVersionFn = unsafe extern "C" fn() -> *const c_char;

/// Signature of the exported registration function
pub type RegisterFn = fn(&mut Registrar<'_>) -> Result<(), RegistryError>;

/// The host's ABI version as a parsed [`Version`]
pub fn host_abi_version() -> Version {
    // ABI_VERSION is a literal checked by the tests below
    Version::new(0, 2, 0)
}

/// Check if a plugin ABI version is compatible with the host
///
/// Uses semantic versioning rules:
/// - Major version must match
/// - For major version 0.x.y, minor versions must match (breaking changes)
/// - For major version >= 1, the plugin minor version can be less than or equal
/// - Patch version is ignored
pub fn is_version_compatible(plugin: &Version, host: &Version) -> bool {
    if plugin.major != host.major {
        return false;
    }

    if plugin.major != 0 {
        plugin.minor <= host.minor
    } else {
        // A plugin for 0.1.x is not compatible with host 0.2.x.
        plugin.minor == host.minor
    }
}

/// Text of a caught panic payload
#[doc(hidden)]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Export the plugin entry points from a `cdylib` crate
///
/// Takes the path of a function with the [`RegisterFn`] signature. A panic in
/// that function is caught inside the plugin and returned as
/// [`RegistryError::PluginFailed`].
///
/// ```rust,ignore
/// gfactory::declare_plugin!(register);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($register:path) => {
        #[no_mangle]
        pub extern "C" fn gfactory_abi_version() -> *const ::std::os::raw::c_char {
            $crate::abi::ABI_VERSION_NUL.as_ptr().cast()
        }

        #[no_mangle]
        pub fn gfactory_register(
            registrar: &mut $crate::Registrar<'_>,
        ) -> ::std::result::Result<(), $crate::RegistryError> {
            let register: $crate::abi::RegisterFn = $register;
            let outcome = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                register(registrar)
            }));
            match outcome {
                Ok(result) => result,
                Err(payload) => Err($crate::RegistryError::PluginFailed(::std::format!(
                    "registration panicked: {}",
                    $crate::abi::panic_message(payload.as_ref())
                ))),
            }
        }
    };
}
