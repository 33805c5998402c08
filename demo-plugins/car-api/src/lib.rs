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
//! Car interface shared between the demo host and car plugins
//!
//! The host only knows this trait. Concrete cars live in plugin libraries
//! and are handed out as [`CarBox`] values by the factories they register.

/// A drivable car
pub trait Car: Send {
    /// Model name
    fn name(&self) -> &str;

    /// Drive the car, returning a report of what happened
    fn go(&mut self) -> String;

    /// State shared by every car model
    fn general_car_var(&self) -> f32 {
        GENERAL_CAR_VAR
    }
}

/// The type car factories produce
pub type CarBox = Box<dyn Car>;

/// Default value of [`Car::general_car_var`]
pub const GENERAL_CAR_VAR: f32 = 44.0;
