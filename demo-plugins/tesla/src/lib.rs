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
//! Demo car plugin
//!
//! Build as a `cdylib` and load it with
//! `FactoryRegistry::register_dynamic_library`. It registers a single
//! factory, `tesla`, producing [`CarBox`] values.

use car_api::{Car, CarBox};
use gfactory::{Registrar, RegistryError};

/// Factory key this plugin registers
pub const TESLA_KEY: &str = "tesla";

/// A car with a small autopilot lookup table
#[derive(Debug, Clone, PartialEq)]
pub struct Tesla {
    autopilot: [[i32; 2]; 2],
}

impl Default for Tesla {
    fn default() -> Self {
        Tesla {
            autopilot: [[0, 1], [10, 11]],
        }
    }
}

impl Tesla {
    /// Autopilot table entry
    pub fn autopilot(&self, row: usize, col: usize) -> Option<i32> {
        self.autopilot.get(row)?.get(col).copied()
    }
}

impl Car for Tesla {
    fn name(&self) -> &str {
        TESLA_KEY
    }

    fn go(&mut self) -> String {
        let table: Vec<String> = self
            .autopilot
            .iter()
            .flatten()
            .map(|value| value.to_string())
            .collect();
        format!(
            "tesla driving, autopilot [{}], general car var {}",
            table.join(", "),
            self.general_car_var()
        )
    }
}

/// Registration entry point
pub fn register(registrar: &mut Registrar<'_>) -> Result<(), RegistryError> {
    registrar.register(TESLA_KEY, || -> CarBox { Box::new(Tesla::default()) })
}

gfactory::declare_plugin!(register);
