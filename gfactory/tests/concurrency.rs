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
//! Concurrent use of a shared registry

use gfactory::abi::ABI_VERSION_NUL;
use gfactory::{
    DynamicLibraryLoader, FactoryRegistry, MemoryBackend, MemoryLibrary, Registrar, RegistryError,
};
use std::os::raw::c_char;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const ROUNDS: usize = 200;

extern "C" fn current_abi() -> *const c_char {
    ABI_VERSION_NUL.as_ptr().cast()
}

fn register_gears(registrar: &mut Registrar<'_>) -> Result<(), RegistryError> {
    registrar.register("gear", || vec![0_u16; 16])
}

#[test]
fn test_parallel_creation_of_distinct_keys() {
    let registry = FactoryRegistry::new("parallel");
    for i in 0..THREADS {
        let key = format!("worker-{i}");
        // Alternate payload types so that tags differ between keys
        if i % 2 == 0 {
            registry.register_factory(key, move || i).unwrap();
        } else {
            registry.register_factory(key, move || i.to_string()).unwrap();
        }
    }

    thread::scope(|scope| {
        for i in 0..THREADS {
            let registry = &registry;
            scope.spawn(move || {
                let key = format!("worker-{i}");
                let expected = registry.type_tag(&key).unwrap();
                for _ in 0..ROUNDS {
                    let handle = registry.create(&key).unwrap();
                    assert_eq!(handle.type_tag(), &expected);
                    if i % 2 == 0 {
                        assert_eq!(handle.downcast_ref::<usize>(), Some(&i));
                    } else {
                        assert_eq!(handle.downcast_ref::<String>(), Some(&i.to_string()));
                    }
                }
            });
        }
    });
}

#[test]
fn test_registration_races_with_creation() {
    let registry = FactoryRegistry::new("racing");
    registry.register_factory("seed", || 0_u64).unwrap();

    thread::scope(|scope| {
        let writer = &registry;
        scope.spawn(move || {
            for i in 0..ROUNDS {
                writer.register_factory(format!("late-{i}"), move || i as u64).unwrap();
            }
        });

        for _ in 0..THREADS {
            let reader = &registry;
            scope.spawn(move || {
                for i in 0..ROUNDS {
                    assert_eq!(*reader.create_as::<u64>("seed").unwrap(), 0);
                    match reader.create_as::<u64>(&format!("late-{i}")) {
                        Ok(value) => assert_eq!(*value, i as u64),
                        Err(RegistryError::KeyNotFound { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }
    });

    assert_eq!(registry.len(), ROUNDS + 1);
}

#[test]
fn test_live_objects_balance_after_threads() {
    let backend = MemoryBackend::new();
    backend.insert("libgears.so", MemoryLibrary::plugin(current_abi, register_gears));
    let registry =
        FactoryRegistry::new("gears").with_loader(DynamicLibraryLoader::new(backend.clone()));
    registry.register_dynamic_library("libgears.so").unwrap();

    let peak = AtomicUsize::new(0);
    thread::scope(|scope| {
        for _ in 0..THREADS {
            let registry = &registry;
            let peak = &peak;
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    let gear = registry.create("gear").unwrap();
                    let live = registry.live_objects("libgears.so").unwrap_or(0);
                    peak.fetch_max(live, Ordering::Relaxed);
                    drop(gear);
                }
            });
        }
    });

    assert!(peak.load(Ordering::Relaxed) >= 1);
    assert_eq!(registry.live_objects("libgears.so"), Some(0));
    registry.unload_library("libgears.so").unwrap();
    assert_eq!(backend.open_count("libgears.so"), 0);
}

#[test]
fn test_unload_never_closes_under_live_object() {
    let backend = MemoryBackend::new();
    backend.insert("libgears.so", MemoryLibrary::plugin(current_abi, register_gears));
    let registry = Arc::new(
        FactoryRegistry::new("gears").with_loader(DynamicLibraryLoader::new(backend.clone())),
    );
    registry.register_dynamic_library("libgears.so").unwrap();

    let unloaded = AtomicBool::new(false);
    thread::scope(|scope| {
        for _ in 0..THREADS {
            let registry = Arc::clone(&registry);
            let backend = backend.clone();
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    match registry.create("gear") {
                        Ok(gear) => {
                            // Holding an object pins its library open
                            assert_eq!(backend.open_count("libgears.so"), 1);
                            assert_eq!(gear.downcast_ref::<Vec<u16>>().map(Vec::len), Some(16));
                        }
                        Err(RegistryError::KeyNotFound { .. }) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
            });
        }

        let unloaded = &unloaded;
        let registry = Arc::clone(&registry);
        scope.spawn(move || {
            while !unloaded.load(Ordering::Acquire) {
                match registry.unload_library("libgears.so") {
                    Ok(()) => unloaded.store(true, Ordering::Release),
                    Err(RegistryError::LibraryStillInUse { .. }) => thread::yield_now(),
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        });
    });

    assert!(unloaded.load(Ordering::Acquire));
    assert!(!registry.contains("gear"));
    assert_eq!(backend.open_count("libgears.so"), 0);
}
