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
//! Bootstrapping a registry from command-line options
//!
//! Arguments are `key=value` pairs. `plugins` lists libraries to load and
//! `factories` lists objects to create, both comma-separated:
//!
//! ```bash
//! cargo run --example startup_options -- factories=circle,square,circle
//! cargo run --example startup_options -- plugins=target/debug/libtesla.so factories=tesla
//! ```

use gfactory::{FactoryRegistry, ObjectHandle, RegistryConfig, StartupOptions};
use std::env;
use std::f64::consts::PI;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

trait Shape: Send {
    fn area(&self) -> f64;
}

struct Circle {
    radius: f64,
}

impl Shape for Circle {
    fn area(&self) -> f64 {
        PI * self.radius * self.radius
    }
}

struct Square {
    side: f64,
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

fn describe(handle: &ObjectHandle) -> String {
    if let Some(shape) = handle.downcast_ref::<Box<dyn Shape>>() {
        format!("shape with area {:.2}", shape.area())
    } else if let Some(car) = handle.downcast_ref::<car_api::CarBox>() {
        format!("car named {}", car.name())
    } else {
        format!("object of type {}", handle.type_tag())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pairs: Vec<(String, String)> = env::args()
        .skip(1)
        .filter_map(|arg| {
            let (key, value) = arg.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect();

    let mut options = StartupOptions::from_pairs(pairs);
    if options.is_empty() {
        options = StartupOptions::from_pairs([("factories", "circle,square")]);
    }
    println!("Startup options: {options:?}\n");

    let registry = FactoryRegistry::with_config("startup", RegistryConfig::from_env());
    let statics = [
        registry.register_factory("circle", || -> Box<dyn Shape> {
            Box::new(Circle { radius: 1.0 })
        }),
        registry.register_factory("square", || -> Box<dyn Shape> {
            Box::new(Square { side: 2.0 })
        }),
    ];
    if let Some(Err(e)) = statics.into_iter().find(Result::is_err) {
        eprintln!("Failed to register static factories: {e}");
        return ExitCode::FAILURE;
    }

    let handles = match registry.bootstrap(&options) {
        Ok(handles) => handles,
        Err(e) => {
            eprintln!("Bootstrap failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    for handle in &handles {
        println!("  {}: {}", handle.key(), describe(handle));
    }

    drop(handles);
    if let Err(e) = registry.close() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
