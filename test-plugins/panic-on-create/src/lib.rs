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
//! Plugin with one working factory and one that panics when called

use gfactory::{Registrar, RegistryError};

/// Factory producing `7_u32`
pub const STURDY_KEY: &str = "sturdy";

/// Factory that panics instead of producing a `u32`
pub const FRAGILE_KEY: &str = "fragile";

/// Message the fragile factory panics with
pub const PANIC_MESSAGE: &str = "constructor bug";

/// Registration entry point
pub fn register(registrar: &mut Registrar<'_>) -> Result<(), RegistryError> {
    registrar.register(STURDY_KEY, || 7_u32)?;
    registrar.register(FRAGILE_KEY, || -> u32 { panic!("{}", PANIC_MESSAGE) })
}

gfactory::declare_plugin!(register);
