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
//! Tests against the platform loader

use gfactory::{FactoryRegistry, RegistryConfig, RegistryError};
use std::fs;

#[test]
fn test_missing_library_file() {
    let registry = FactoryRegistry::new("system");
    let result = registry.register_dynamic_library("/nonexistent/dir/libtesla.so");
    assert!(matches!(result, Err(RegistryError::LibraryNotFound { .. })));
    assert!(registry.libraries().is_empty());
}

#[test]
fn test_file_that_is_not_a_library() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = dir.path().join("libbogus.so");
    fs::write(&bogus, b"definitely not an object file").unwrap();

    let registry = FactoryRegistry::new("system");
    match registry.register_dynamic_library(&bogus) {
        Err(RegistryError::LibraryNotFound { path, reason }) => {
            assert_eq!(path, bogus);
            assert!(!reason.is_empty());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn test_search_path_is_consulted() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("libbogus.so"), b"").unwrap();

    let config = RegistryConfig::new().with_search_path(dir.path());
    let registry = FactoryRegistry::with_config("system", config);

    // Found through the search path, then rejected by the platform loader
    match registry.register_dynamic_library("libbogus.so") {
        Err(RegistryError::LibraryNotFound { reason, .. }) => {
            assert!(reason.contains(&*dir.path().to_string_lossy()));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn test_library_without_entry_points() {
    let registry = FactoryRegistry::new("system");
    let result = registry.register_dynamic_library("libm.so.6");
    assert!(matches!(
        result,
        Err(RegistryError::SymbolNotFound { ref symbol, .. }) if symbol == "gfactory_abi_version"
    ));
    assert!(registry.libraries().is_empty());
}
