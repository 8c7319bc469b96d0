use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("Unknown global parameter '{0}'")]
    Unknown(String),
    #[error(
        "Global parameter '{name}' is already registered with default {existing} {unit}, cannot redefine it as {requested}"
    )]
    Conflict {
        name: String,
        unit: &'static str,
        existing: f64,
        requested: f64,
    },
    #[error("Value {value} for global parameter '{name}' is not finite")]
    NonFinite { name: String, value: f64 },
}

/// Declaration of a named global parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub default: f64,
    /// Unit label, for diagnostics only.
    pub unit: &'static str,
}

impl ParameterSpec {
    pub fn new(name: &str, default: f64, unit: &'static str) -> Self {
        Self {
            name: name.to_string(),
            default,
            unit,
        }
    }
}

/// Named global parameters owned by an integration context.
///
/// Forces declare the parameters they read; the table is the single place their values
/// live, so they can be changed between steps without rebuilding any force.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    specs: Vec<ParameterSpec>,
    values: Vec<f64>,
    index: HashMap<String, usize>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter and sets it to its default.
    ///
    /// Registering the same name again with an identical default is a no-op, so several
    /// forces may share one parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Conflict`] if the name exists with a different default or
    /// unit, and [`ParameterError::NonFinite`] for a non-finite default.
    pub fn register(&mut self, spec: ParameterSpec) -> Result<(), ParameterError> {
        if !spec.default.is_finite() {
            return Err(ParameterError::NonFinite {
                name: spec.name,
                value: spec.default,
            });
        }
        if let Some(&slot) = self.index.get(&spec.name) {
            let existing = &self.specs[slot];
            if existing.default == spec.default && existing.unit == spec.unit {
                return Ok(());
            }
            return Err(ParameterError::Conflict {
                name: spec.name,
                unit: existing.unit,
                existing: existing.default,
                requested: spec.default,
            });
        }
        self.index.insert(spec.name.clone(), self.specs.len());
        self.values.push(spec.default);
        self.specs.push(spec);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ParameterError::Unknown`] for unregistered names and
    /// [`ParameterError::NonFinite`] for NaN or infinite values.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        let slot = *self
            .index
            .get(name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
        if !value.is_finite() {
            return Err(ParameterError::NonFinite {
                name: name.to_string(),
                value,
            });
        }
        self.values[slot] = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<f64, ParameterError> {
        self.index
            .get(name)
            .map(|&slot| self.values[slot])
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))
    }

    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.index.get(name).map(|&slot| &self.specs[slot])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Iterates over `(name, value)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.specs
            .iter()
            .zip(&self.values)
            .map(|(spec, &value)| (spec.name.as_str(), value))
    }
}
