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
//! A factory from a real shared library that panics during construction

use gfactory::{DylibBackend, FactoryRegistry, RegistryError};
use panic_on_create::{FRAGILE_KEY, PANIC_MESSAGE, STURDY_KEY};
use std::env;
use std::path::{Path, PathBuf};

fn built_plugin() -> PathBuf {
    let exe = env::current_exe().unwrap();
    let deps = exe.parent().unwrap().to_path_buf();
    let mut dirs = vec![deps.clone()];
    dirs.extend(deps.parent().map(Path::to_path_buf));

    DylibBackend::new(dirs.clone())
        .locate(Path::new("panic_on_create"))
        .unwrap_or_else(|| panic!("panic_on_create library not built in any of {dirs:?}"))
}

#[test]
fn test_constructor_panic_is_reported() {
    let path = built_plugin();
    let registry = FactoryRegistry::new("fixtures");
    registry.register_dynamic_library(&path).unwrap();

    let sturdy = registry.create_as::<u32>(STURDY_KEY).unwrap();
    assert_eq!(*sturdy, 7);

    match registry.create(FRAGILE_KEY) {
        Err(RegistryError::CreationFailed { key, reason }) => {
            assert_eq!(key, FRAGILE_KEY);
            assert!(reason.contains(PANIC_MESSAGE));
        }
        Err(other) => panic!("expected a creation failure, got {other:?}"),
        Ok(_) => panic!("fragile factory produced an object"),
    }

    // Only the sturdy object holds the library open
    assert_eq!(registry.live_objects(&path), Some(1));
    drop(sturdy);
    assert_eq!(registry.live_objects(&path), Some(0));

    registry.unload_library(&path).unwrap();
    assert!(registry.libraries().is_empty());
}
