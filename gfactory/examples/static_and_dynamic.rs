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
//! Static and dynamic factories side by side
//!
//! The first registry knows its shape types at compile time. The second only
//! knows the `Car` interface and gets the concrete car from a plugin.
//!
//! Build the demo plugin and pass its path (or put its directory on
//! `GFACTORY_PLUGIN_PATH` and pass `tesla`):
//!
//! ```bash
//! cargo build -p tesla
//! cargo run --example static_and_dynamic -- target/debug/libtesla.so
//! ```
//!
//! Set `RUST_LOG=gfactory=debug` to watch the registry at work.

use car_api::CarBox;
use gfactory::{FactoryRegistry, RegistryConfig, RegistryEvent};
use std::env;
use tracing_subscriber::EnvFilter;

trait Shape: Send {
    fn name(&self) -> &str;
    fn area(&self) -> f64;
}

struct Triangle;

impl Shape for Triangle {
    fn name(&self) -> &str {
        "triangle"
    }

    fn area(&self) -> f64 {
        0.5 * 3.0 * 4.0
    }
}

struct Cuboid {
    side: f64,
}

impl Shape for Cuboid {
    fn name(&self) -> &str {
        "box"
    }

    fn area(&self) -> f64 {
        6.0 * self.side * self.side
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("gfactory - Static and Dynamic Factories");
    println!("=======================================\n");

    // Shapes: every concrete type is known to the host
    let shapes = FactoryRegistry::new("shapes");
    shapes
        .register_factory("triangle", || -> Box<dyn Shape> { Box::new(Triangle) })
        .expect("triangle registers");
    shapes
        .register_factory("box1", || -> Box<dyn Shape> { Box::new(Cuboid { side: 1.0 }) })
        .expect("box1 registers");
    shapes
        .register_factory("box2", || -> Box<dyn Shape> { Box::new(Cuboid { side: 2.0 }) })
        .expect("box2 registers");

    for key in shapes.keys() {
        match shapes.create_as::<Box<dyn Shape>>(&key) {
            Ok(shape) => println!("  {key}: {} with area {:.1}", shape.name(), shape.area()),
            Err(e) => println!("  {key}: {e}"),
        }
    }

    if let Err(e) = shapes.create_as::<CarBox>("triangle") {
        println!("  asking a shape factory for a car: {e}");
    }

    shapes.close().expect("no shape library is in use");

    // Cars: the host only knows the interface
    println!();
    let plugin = env::args().nth(1).unwrap_or_else(|| "tesla".to_string());
    let cars = FactoryRegistry::with_config("cars", RegistryConfig::from_env()).with_observer(
        |event: &RegistryEvent| {
            if let RegistryEvent::LibraryLoaded { path, keys } = event {
                println!("  loaded {} providing {:?}", path.display(), keys);
            }
        },
    );

    if let Err(e) = cars.register_dynamic_library(&plugin) {
        println!("  could not load {plugin}: {e}");
        println!("  build the demo plugin with `cargo build -p tesla` and pass its path");
        return;
    }

    for key in cars.keys() {
        match cars.create_as::<CarBox>(&key) {
            Ok(mut car) => {
                println!("  {key}: {}", car.go());
                println!("  {key}: general car var {}", car.general_car_var());
            }
            Err(e) => println!("  {key}: {e}"),
        }
    }

    // Every car has been dropped, so the plugin can be closed
    match cars.close() {
        Ok(()) => println!("\nAll libraries closed"),
        Err(e) => println!("\n{e}"),
    }
}
