// Copyright 2025 The Veneer Authors
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

//! Metafunction name resolution
//!
//! The builtin set is always available. With the `dynamic-metafunctions`
//! feature, additional metafunctions can be loaded from shared libraries
//! that export symbols named `veneer_metafunction_<name>`.

use super::metafunctions;
use super::TypeView;

/// A metafunction: inspects and mutates one type declaration through its
/// view. Pure function pointer so dynamically loaded implementations have
/// the same shape as builtins.
pub type Metafunction = fn(&mut TypeView);

/// Name-to-function resolution
pub trait MetafunctionRegistry {
    fn resolve(&self, name: &str) -> Option<Metafunction>;
}

/// The builtin metafunction set
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRegistry;

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl MetafunctionRegistry for BuiltinRegistry {
    fn resolve(&self, name: &str) -> Option<Metafunction> {
        Some(match name {
            "interface" => metafunctions::interface,
            "polymorphic_base" => metafunctions::polymorphic_base,
            "ordered" => metafunctions::ordered,
            "weakly_ordered" => metafunctions::weakly_ordered,
            "partially_ordered" => metafunctions::partially_ordered,
            "copyable" => metafunctions::copyable,
            "basic_value" => metafunctions::basic_value,
            "value" => metafunctions::value,
            "weakly_ordered_value" => metafunctions::weakly_ordered_value,
            "partially_ordered_value" => metafunctions::partially_ordered_value,
            "struct" => metafunctions::plain_struct,
            "basic_enum" => metafunctions::basic_enum,
            "enum" => metafunctions::value_enum,
            "flag_enum" => metafunctions::flag_enum,
            "union" => metafunctions::union_type,
            "print" => metafunctions::print,
            _ => return None,
        })
    }
}

/// Exported symbol prefix for dynamically loaded metafunctions
#[cfg(feature = "dynamic-metafunctions")]
pub const SYMBOL_PREFIX: &str = "veneer_metafunction_";

/// Builtin set plus metafunctions loaded from shared libraries
///
/// Builtins win on name collision. Loaded libraries stay alive for the
/// registry's lifetime; resolved function pointers must not outlive it.
#[cfg(feature = "dynamic-metafunctions")]
pub struct DynamicRegistry {
    builtin: BuiltinRegistry,
    libraries: Vec<libloading::Library>,
}

#[cfg(feature = "dynamic-metafunctions")]
impl DynamicRegistry {
    pub fn new() -> Self {
        Self {
            builtin: BuiltinRegistry::new(),
            libraries: Vec::new(),
        }
    }

    /// Load one shared library of metafunctions
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialization code; the caller must
    /// trust the library.
    pub unsafe fn load(&mut self, path: &std::path::Path) -> Result<(), libloading::Error> {
        let library = libloading::Library::new(path)?;
        self.libraries.push(library);
        Ok(())
    }
}

#[cfg(feature = "dynamic-metafunctions")]
impl Default for DynamicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "dynamic-metafunctions")]
impl MetafunctionRegistry for DynamicRegistry {
    fn resolve(&self, name: &str) -> Option<Metafunction> {
        if let Some(builtin) = self.builtin.resolve(name) {
            return Some(builtin);
        }
        let symbol = format!("{SYMBOL_PREFIX}{name}\0");
        for library in &self.libraries {
            let found = unsafe { library.get::<Metafunction>(symbol.as_bytes()) };
            if let Ok(function) = found {
                return Some(*function);
            }
        }
        None
    }
}
