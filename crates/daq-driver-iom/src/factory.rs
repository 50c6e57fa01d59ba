//! String-keyed registry of device and map classes.
//!
//! The connection manager never names a concrete board or map type. Each
//! `[[devices]]` / `[[maps]]` entry carries a `class` string that selects a
//! factory here:
//!
//! ```toml
//! [[devices]]
//! name = "dio0"
//! class = "dio-404"
//! devn = 0
//!
//! [devices.config]
//! voltage_reference = 24.0
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{DeviceDefinition, MapDefinition};
use crate::device::{ModelCode, SharedDevice};
use crate::digital_io::{DigitalIoConfig, DigitalIoDevice, DIO_404_MODEL};
use crate::error::{IomError, Result};
use crate::map::{BufferedMap, Map, MapCore, PointMap};

/// Builds boards of one class.
pub trait DeviceFactory: Send + Sync {
    /// Class string used in configuration files.
    fn class(&self) -> &'static str;

    /// Model code the chassis reports for boards of this class.
    fn model(&self) -> ModelCode;

    /// Check the class-specific settings without building anything.
    fn validate(&self, definition: &DeviceDefinition) -> Result<()>;

    /// Build a board from its definition.
    fn build(&self, definition: &DeviceDefinition) -> Result<SharedDevice>;
}

/// Builds maps of one class.
pub trait MapFactory: Send + Sync {
    fn class(&self) -> &'static str;

    fn build(&self, definition: &MapDefinition) -> Result<Box<dyn Map>>;
}

/// Factory for the 12-in / 12-out digital board.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigitalIoFactory;

impl DeviceFactory for DigitalIoFactory {
    fn class(&self) -> &'static str {
        DigitalIoDevice::CLASS
    }

    fn model(&self) -> ModelCode {
        DIO_404_MODEL
    }

    fn validate(&self, definition: &DeviceDefinition) -> Result<()> {
        DigitalIoConfig::from_value(&definition.config)?.validate()
    }

    fn build(&self, definition: &DeviceDefinition) -> Result<SharedDevice> {
        let config = DigitalIoConfig::from_value(&definition.config)?;
        let device = DigitalIoDevice::new(definition.identity(), config)?;
        Ok(Arc::new(Mutex::new(device)))
    }
}

/// Factory for `point` maps.
#[derive(Debug, Default, Clone, Copy)]
pub struct PointMapFactory;

impl MapFactory for PointMapFactory {
    fn class(&self) -> &'static str {
        PointMap::CLASS
    }

    fn build(&self, definition: &MapDefinition) -> Result<Box<dyn Map>> {
        Ok(Box::new(PointMap::new(MapCore::from_definition(definition))))
    }
}

/// Factory for `buffered` maps.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferedMapFactory;

impl MapFactory for BufferedMapFactory {
    fn class(&self) -> &'static str {
        BufferedMap::CLASS
    }

    fn build(&self, definition: &MapDefinition) -> Result<Box<dyn Map>> {
        Ok(Box::new(BufferedMap::new(MapCore::from_definition(
            definition,
        ))))
    }
}

/// Registry of device and map factories keyed by class.
#[derive(Default)]
pub struct DriverRegistry {
    devices: HashMap<String, Box<dyn DeviceFactory>>,
    maps: HashMap<String, Box<dyn MapFactory>>,
}

impl DriverRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in class.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_device_factory(Box::new(DigitalIoFactory));
        registry.register_map_factory(Box::new(PointMapFactory));
        registry.register_map_factory(Box::new(BufferedMapFactory));
        registry
    }

    /// Register a device factory, returning the one it replaces.
    pub fn register_device_factory(
        &mut self,
        factory: Box<dyn DeviceFactory>,
    ) -> Option<Box<dyn DeviceFactory>> {
        debug!(
            class = factory.class(),
            model = %factory.model(),
            "Registering device factory"
        );
        self.devices.insert(factory.class().to_string(), factory)
    }

    /// Register a map factory, returning the one it replaces.
    pub fn register_map_factory(
        &mut self,
        factory: Box<dyn MapFactory>,
    ) -> Option<Box<dyn MapFactory>> {
        debug!(class = factory.class(), "Registering map factory");
        self.maps.insert(factory.class().to_string(), factory)
    }

    pub fn has_device_class(&self, class: &str) -> bool {
        self.devices.contains_key(class)
    }

    pub fn has_map_class(&self, class: &str) -> bool {
        self.maps.contains_key(class)
    }

    /// Registered device classes, sorted.
    pub fn device_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.devices.keys().cloned().collect();
        classes.sort();
        classes
    }

    /// Registered map classes, sorted.
    pub fn map_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.maps.keys().cloned().collect();
        classes.sort();
        classes
    }

    pub fn device_factory(&self, class: &str) -> Result<&dyn DeviceFactory> {
        self.devices
            .get(class)
            .map(|f| f.as_ref())
            .ok_or_else(|| IomError::UnknownClass {
                category: "device",
                class: class.to_string(),
            })
    }

    pub fn map_factory(&self, class: &str) -> Result<&dyn MapFactory> {
        self.maps
            .get(class)
            .map(|f| f.as_ref())
            .ok_or_else(|| IomError::UnknownClass {
                category: "map",
                class: class.to_string(),
            })
    }

    /// Validate and build a board.
    pub fn build_device(&self, definition: &DeviceDefinition) -> Result<SharedDevice> {
        let factory = self.device_factory(&definition.class)?;
        factory.validate(definition)?;
        factory.build(definition)
    }

    /// Build a map.
    pub fn build_map(&self, definition: &MapDefinition) -> Result<Box<dyn Map>> {
        self.map_factory(&definition.class)?.build(definition)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("devices", &self.device_classes())
            .field("maps", &self.map_classes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::ExecutionMode;

    fn dio_definition(config: &str) -> DeviceDefinition {
        DeviceDefinition {
            name: "dio0".into(),
            class: "dio-404".into(),
            devn: 0,
            number_of_buffers: 2,
            samples_per_channel: 1,
            config: toml::from_str(config).expect("toml"),
        }
    }

    #[test]
    fn test_defaults_registered() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.device_classes(), vec!["dio-404"]);
        assert_eq!(registry.map_classes(), vec!["buffered", "point"]);
        assert!(registry.has_device_class("dio-404"));
        assert!(!registry.has_map_class("streaming"));
    }

    #[test]
    fn test_build_device() {
        let registry = DriverRegistry::with_defaults();
        let device = registry
            .build_device(&dio_definition("voltage_reference = 5.0"))
            .expect("build");
        let device = device.lock();
        assert_eq!(device.name(), "dio0");
        assert_eq!(device.model(), DIO_404_MODEL);
        assert_eq!(device.class_name(), "dio-404");
    }

    #[test]
    fn test_build_device_rejects_bad_config() {
        let registry = DriverRegistry::with_defaults();
        let err = registry
            .build_device(&dio_definition(
                "voltage_reference = 5.0\nlower_hysteresis = 1.0",
            ))
            .unwrap_err();
        assert!(matches!(err, IomError::InvalidHysteresis { .. }));

        let err = registry.build_device(&dio_definition("")).unwrap_err();
        assert!(matches!(err, IomError::InvalidConfig { .. }));
    }

    #[test]
    fn test_unknown_classes() {
        let registry = DriverRegistry::with_defaults();
        let mut def = dio_definition("voltage_reference = 5.0");
        def.class = "ai-217".into();
        assert!(matches!(
            registry.build_device(&def),
            Err(IomError::UnknownClass { category: "device", .. })
        ));

        let map = MapDefinition {
            name: "m".into(),
            class: "streaming".into(),
            execution_mode: ExecutionMode::Polled,
            scan_rate_hz: 1.0,
            inputs: vec![],
            outputs: vec![],
        };
        assert!(matches!(
            registry.build_map(&map),
            Err(IomError::UnknownClass { category: "map", .. })
        ));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = DriverRegistry::new();
        assert!(registry
            .register_map_factory(Box::new(PointMapFactory))
            .is_none());
        assert!(registry
            .register_map_factory(Box::new(PointMapFactory))
            .is_some());
    }
}
