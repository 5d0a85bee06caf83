// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph-scoped named variables.
//!
//! Slots are last-writer-wins. Every write stamps a version taken from a
//! counter that only grows, so a reader can compare the version it observed
//! with the version a particular writer produced.

use crate::port::PortType;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// Write stamp of a variable slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Version(pub u64);

/// A named variable slot
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    /// Declared type, fixed by the first write
    pub ty: PortType,
    /// Current value, `None` once cleared
    pub value: Option<Value>,
    /// Stamp of the last write or clear
    pub version: Version,
}

/// Names pre-defined in every function graph
pub const BUILTIN_VARIABLES: [&str; 3] = ["PI", "Rad2Deg", "Deg2Rad"];

/// Variable slots of one graph
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    slots: IndexMap<String, VariableDefinition>,
    clock: u64,
}

impl VariableTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with the math constants function graphs expose
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.set("PI", Value::Float(PI));
        table.set("Rad2Deg", Value::Float(180.0 / PI));
        table.set("Deg2Rad", Value::Float(PI / 180.0));
        table
    }

    fn tick(&mut self) -> Version {
        self.clock += 1;
        Version(self.clock)
    }

    /// Write a value, returning the new version
    pub fn set(&mut self, name: &str, value: Value) -> Version {
        let version = self.tick();
        let slot = VariableDefinition {
            ty: value.port_type(),
            value: Some(value),
            version,
        };
        self.slots.insert(name.to_string(), slot);
        version
    }

    /// Current value
    pub fn get(&self, name: &str) -> Option<Value> {
        self.slots.get(name).and_then(|d| d.value)
    }

    /// Full slot, including type and version
    pub fn definition(&self, name: &str) -> Option<&VariableDefinition> {
        self.slots.get(name)
    }

    /// Version of the last write, if the slot exists
    pub fn version(&self, name: &str) -> Option<Version> {
        self.slots.get(name).map(|d| d.version)
    }

    /// Clear a slot's value but keep its declaration
    pub fn clear(&mut self, name: &str) {
        if self.slots.contains_key(name) {
            let version = self.tick();
            if let Some(slot) = self.slots.get_mut(name) {
                slot.value = None;
                slot.version = version;
            }
        }
    }

    /// Remove a slot entirely
    pub fn remove(&mut self, name: &str) -> Option<VariableDefinition> {
        self.slots.shift_remove(name)
    }

    /// Whether a slot exists
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Names of slots holding `ty`, sorted
    pub fn names_of_type(&self, ty: PortType) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, d)| d.ty == ty)
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Iterate all slots in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VariableDefinition)> {
        self.slots.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_increase() {
        let mut vars = VariableTable::new();
        let a = vars.set("x", Value::Float(1.0));
        let b = vars.set("y", Value::Float(2.0));
        let c = vars.set("x", Value::Float(3.0));
        assert!(a < b && b < c);
        assert_eq!(vars.version("x"), Some(c));
        assert_eq!(vars.get("x"), Some(Value::Float(3.0)));
    }

    #[test]
    fn test_clear_keeps_slot() {
        let mut vars = VariableTable::new();
        let written = vars.set("x", Value::Float(1.0));
        vars.clear("x");
        assert!(vars.contains("x"));
        assert_eq!(vars.get("x"), None);
        assert!(vars.version("x").unwrap() > written);
    }

    #[test]
    fn test_builtins_and_type_listing() {
        let mut vars = VariableTable::with_builtins();
        vars.set("dir", Value::Float2([0.0, 1.0]));
        assert_eq!(vars.names_of_type(PortType::Float), vec!["Deg2Rad", "PI", "Rad2Deg"]);
        assert_eq!(vars.names_of_type(PortType::Float2), vec!["dir"]);
    }
}
