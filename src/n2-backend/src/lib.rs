// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;

use n2_app::normalize_name;
use n2_core::{DynResult, FieldDevice};

#[cfg(feature = "modbus")]
pub mod modbus;
pub mod sim;

#[cfg(feature = "modbus")]
pub use modbus::ModbusPlc;
pub use sim::SimulatedPlc;

/// Connection details for instantiating a field-device backend.
#[derive(Debug, Clone)]
pub enum FieldAccess {
    Tcp { addr: String, unit_id: u8 },
    Simulated { seed: u64 },
}

pub type BackendFactory = fn(FieldAccess) -> DynResult<Box<dyn FieldDevice>>;

/// Context for registering and instantiating field-device backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "modbus").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        let key = normalize_name(name);
        self.factories.insert(key, factory);
    }

    /// Check whether a backend name is registered.
    pub fn is_backend_registered(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.factories.contains_key(&key)
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a backend based on the selected name and access method.
    pub fn build_device(&self, name: &str, access: FieldAccess) -> DynResult<Box<dyn FieldDevice>> {
        let key = normalize_name(name);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| format!("Unknown field backend: {}", name))?;
        factory(access)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Register all built-in backends enabled by features on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("sim", sim_factory);
    #[cfg(feature = "modbus")]
    context.register_backend("modbus", modbus_factory);
}

fn sim_factory(access: FieldAccess) -> DynResult<Box<dyn FieldDevice>> {
    match access {
        FieldAccess::Simulated { seed } => Ok(Box::new(SimulatedPlc::new(seed))),
        FieldAccess::Tcp { .. } => Ok(Box::new(SimulatedPlc::new(0))),
    }
}

#[cfg(feature = "modbus")]
fn modbus_factory(access: FieldAccess) -> DynResult<Box<dyn FieldDevice>> {
    match access {
        FieldAccess::Tcp { addr, unit_id } => Ok(Box::new(ModbusPlc::new(addr, unit_id))),
        FieldAccess::Simulated { .. } => Err("modbus backend requires Tcp access".into()),
    }
}
