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
//! Plugin that registers a factory and then panics
//!
//! Loading it must fail cleanly with the partial registration rolled back.

use gfactory::{Registrar, RegistryError};

/// Key registered before the panic
pub const DOOMED_KEY: &str = "doomed";

/// Message the entry point panics with
pub const PANIC_MESSAGE: &str = "plugin bug";

/// Registration entry point
pub fn register(registrar: &mut Registrar<'_>) -> Result<(), RegistryError> {
    registrar.register(DOOMED_KEY, || 1_u8)?;
    panic!("{}", PANIC_MESSAGE);
}

gfactory::declare_plugin!(register);
