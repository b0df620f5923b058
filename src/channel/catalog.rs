//! Static channel catalog and property descriptor registry.
//!
//! Both are supplied by the instrument configuration. The planner never
//! introspects devices; every editable column comes from a
//! [`PropertyDescriptor`].

use super::value::{CellValue, ColumnType};
use crate::error::{PlannerError, PlannerResult};
use crate::validation::is_not_empty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channel name → device kind → device names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelCatalog {
    channels: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl ChannelCatalog {
    /// Wrap a raw mapping.
    pub fn new(channels: BTreeMap<String, BTreeMap<String, Vec<String>>>) -> Self {
        Self { channels }
    }

    /// Add one device of `kind` to `channel`.
    pub fn with_device(mut self, channel: &str, kind: &str, device: &str) -> Self {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .entry(kind.to_string())
            .or_default()
            .push(device.to_string());
        self
    }

    /// Whether `channel` is known.
    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Channel names in catalog order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Device kinds of `channel`.
    pub fn device_kinds(&self, channel: &str) -> PlannerResult<&BTreeMap<String, Vec<String>>> {
        self.channels
            .get(channel)
            .ok_or_else(|| PlannerError::ChannelUnknown(channel.to_string()))
    }

    /// Every device participating in `channel`, in kind order.
    pub fn devices(&self, channel: &str) -> PlannerResult<Vec<&str>> {
        Ok(self
            .device_kinds(channel)?
            .values()
            .flatten()
            .map(String::as_str)
            .collect())
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True when no channels are defined.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Configured kind of a device property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Integer.
    Int,
    /// Float.
    Float,
    /// Free text.
    String,
    /// Fixed option set.
    Enum,
    /// Read-only.
    Opaque,
}

/// Description of one editable device property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Device name.
    pub device: String,
    /// Property name.
    pub property: String,
    /// Value kind.
    pub kind: PropertyKind,
    /// Inclusive lower bound (numeric kinds).
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound (numeric kinds).
    #[serde(default)]
    pub max: Option<f64>,
    /// Editor increment. Informational.
    #[serde(default)]
    pub step: Option<f64>,
    /// Display unit. Informational.
    #[serde(default)]
    pub unit: Option<String>,
    /// Value for freshly seeded cells. Falls back to the device set-point.
    #[serde(default)]
    pub initial: Option<CellValue>,
    /// Allowed values (enum kind).
    #[serde(default)]
    pub options: Vec<String>,
}

impl PropertyDescriptor {
    /// Descriptor with no bounds, unit or initial value.
    pub fn new(device: &str, property: &str, kind: PropertyKind) -> Self {
        Self {
            device: device.to_string(),
            property: property.to_string(),
            kind,
            min: None,
            max: None,
            step: None,
            unit: None,
            initial: None,
            options: Vec::new(),
        }
    }

    /// Set inclusive numeric bounds.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Set the initial value.
    pub fn with_initial(mut self, initial: impl Into<CellValue>) -> Self {
        self.initial = Some(initial.into());
        self
    }

    /// Set the enum options.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Column key `device.property`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.device, self.property)
    }

    /// Column type derived from the descriptor.
    pub fn column_type(&self) -> ColumnType {
        match self.kind {
            PropertyKind::Int => ColumnType::Int {
                min: self.min,
                max: self.max,
            },
            PropertyKind::Float => ColumnType::Float {
                min: self.min,
                max: self.max,
            },
            PropertyKind::String => ColumnType::String,
            PropertyKind::Enum => ColumnType::Enum(self.options.clone()),
            PropertyKind::Opaque => ColumnType::Opaque,
        }
    }

    /// Check internal consistency, including that `initial` fits the column.
    pub fn validate(&self) -> PlannerResult<()> {
        let name = self.qualified_name();
        is_not_empty(&self.device)
            .and_then(|_| is_not_empty(&self.property))
            .map_err(|e| {
                PlannerError::Configuration(format!("property descriptor '{name}': {e}"))
            })?;
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(PlannerError::Configuration(format!(
                    "property '{name}' has min {min} above max {max}"
                )));
            }
        }
        if self.kind == PropertyKind::Enum && self.options.is_empty() {
            return Err(PlannerError::Configuration(format!(
                "enum property '{name}' declares no options"
            )));
        }
        if let Some(initial) = &self.initial {
            let ty = self.column_type();
            if ty.is_settable() {
                ty.coerce(&name, initial.clone())
                    .map_err(|e| PlannerError::Configuration(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Descriptors keyed by device, then property.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    by_device: BTreeMap<String, BTreeMap<String, PropertyDescriptor>>,
}

impl PropertyRegistry {
    /// Build a registry from a descriptor list. Later duplicates win.
    pub fn new(descriptors: impl IntoIterator<Item = PropertyDescriptor>) -> Self {
        let mut registry = Self::default();
        for descriptor in descriptors {
            registry.insert(descriptor);
        }
        registry
    }

    /// Register one descriptor.
    pub fn insert(&mut self, descriptor: PropertyDescriptor) {
        self.by_device
            .entry(descriptor.device.clone())
            .or_default()
            .insert(descriptor.property.clone(), descriptor);
    }

    /// Descriptor of `device.property`.
    pub fn get(&self, device: &str, property: &str) -> Option<&PropertyDescriptor> {
        self.by_device.get(device)?.get(property)
    }

    /// Descriptors of `device` in property-name order.
    pub fn for_device(&self, device: &str) -> impl Iterator<Item = &PropertyDescriptor> {
        self.by_device.get(device).into_iter().flat_map(|m| m.values())
    }
}

/// Current device set-points, used when a descriptor has no `initial` value.
pub trait SetpointSource: Send + Sync {
    /// Current value of `device.property`, if the device reports one.
    fn setpoint(&self, device: &str, property: &str) -> Option<CellValue>;
}

/// A set-point source that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSetpoints;

impl SetpointSource for NoSetpoints {
    fn setpoint(&self, _device: &str, _property: &str) -> Option<CellValue> {
        None
    }
}

impl SetpointSource for BTreeMap<(String, String), CellValue> {
    fn setpoint(&self, device: &str, property: &str) -> Option<CellValue> {
        self.get(&(device.to_string(), property.to_string())).cloned()
    }
}
