//! Named registry of drivers.
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use opentelemetry::{otel_debug, otel_warn};

use crate::driver::{Conn, Driver};
use crate::options::Options;
use crate::wrap::wrap_driver;
use crate::{Error, Result};

/// Upper bound of the suffix tried when registering an instrumented driver.
const MAX_WRAPPED_SLOTS: usize = 100;

/// Drivers registered by name.
///
/// ```
/// use std::sync::Arc;
///
/// use opentelemetry_sql::driver::{Conn, Driver};
/// use opentelemetry_sql::{Options, Registry, Result};
///
/// struct MyDriver;
///
/// impl Driver for MyDriver {
///     fn open(&self, _name: &str) -> Result<Box<dyn Conn>> {
///         unimplemented!()
///     }
/// }
///
/// let registry = Registry::new();
/// registry.register_driver("mydb", Arc::new(MyDriver))?;
///
/// let name = registry.register_wrapped("mydb", Options::default())?;
/// assert_eq!(name, "mydb-otelsql-0");
/// # Ok::<(), opentelemetry_sql::Error>(())
/// ```
#[derive(Default)]
pub struct Registry {
    drivers: Mutex<HashMap<String, Arc<dyn Driver>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("drivers", &self.drivers())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<dyn Driver>>>> {
        self.drivers
            .lock()
            .map_err(|err| Error::Other(format!("driver registry lock poisoned: {err}")))
    }

    /// Registers `driver` under `name`.
    pub fn register_driver(&self, name: impl Into<String>, driver: Arc<dyn Driver>) -> Result<()> {
        let name = name.into();
        let mut drivers = self.lock()?;
        if drivers.contains_key(&name) {
            return Err(Error::DuplicateDriver(name));
        }

        otel_debug!(name: "Registry.DriverRegistered", driver_name = name.as_str());
        drivers.insert(name, driver);

        Ok(())
    }

    /// Registers an instrumented copy of the driver registered under `name`
    /// and returns the name it was registered under.
    ///
    /// The new name is `<name>-otelsql-<n>` with the lowest free `n` below
    /// 100.
    pub fn register_wrapped(&self, name: &str, options: Options) -> Result<String> {
        let mut drivers = self.lock()?;
        let driver = drivers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DriverNotFound(name.to_string()))?;

        let Some(wrapped_name) = (0..MAX_WRAPPED_SLOTS)
            .map(|i| format!("{name}-otelsql-{i}"))
            .find(|candidate| !drivers.contains_key(candidate))
        else {
            otel_warn!(name: "Registry.SlotsExhausted", driver_name = name);
            return Err(Error::RegistryFull(name.to_string()));
        };

        drivers.insert(wrapped_name.clone(), Arc::new(wrap_driver(driver, options)));
        otel_debug!(
            name: "Registry.WrappedDriverRegistered",
            driver_name = name,
            wrapped_name = wrapped_name.as_str()
        );

        Ok(wrapped_name)
    }

    /// Returns the driver registered under `name`.
    pub fn driver(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.lock()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DriverNotFound(name.to_string()))
    }

    /// Opens a connection with the driver registered under `driver_name`.
    pub fn open(&self, driver_name: &str, name: &str) -> Result<Box<dyn Conn>> {
        self.driver(driver_name)?.open(name)
    }

    /// Sorted names of the registered drivers.
    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.drivers.lock() {
            Ok(drivers) => drivers.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();

        names
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::Context;

    use super::*;
    use crate::capability::Capabilities;
    use crate::testing::{InMemoryMetricsSink, MockBackend};

    fn registry_with_mock(backend: &MockBackend) -> Registry {
        let registry = Registry::new();
        registry
            .register_driver("mock", Arc::new(backend.driver()))
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let backend = MockBackend::new(Capabilities::empty());
        let registry = registry_with_mock(&backend);

        let err = registry
            .register_driver("mock", Arc::new(backend.driver()))
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateDriver(name) if name == "mock"));
    }

    #[test]
    fn wrapped_names_take_free_slots() {
        let backend = MockBackend::new(Capabilities::empty());
        let registry = registry_with_mock(&backend);

        assert_eq!(
            registry.register_wrapped("mock", Options::default()).unwrap(),
            "mock-otelsql-0"
        );
        assert_eq!(
            registry.register_wrapped("mock", Options::default()).unwrap(),
            "mock-otelsql-1"
        );
        assert_eq!(
            registry.drivers(),
            vec!["mock", "mock-otelsql-0", "mock-otelsql-1"]
        );
    }

    #[test]
    fn unknown_driver() {
        let registry = Registry::new();

        assert!(matches!(
            registry.register_wrapped("missing", Options::default()),
            Err(Error::DriverNotFound(name)) if name == "missing"
        ));
        assert!(registry.driver("missing").is_err());
    }

    #[test]
    fn slots_are_exhausted() {
        let backend = MockBackend::new(Capabilities::empty());
        let registry = registry_with_mock(&backend);
        for i in 0..MAX_WRAPPED_SLOTS {
            registry
                .register_driver(format!("mock-otelsql-{i}"), Arc::new(backend.driver()))
                .unwrap();
        }

        assert!(matches!(
            registry.register_wrapped("mock", Options::default()),
            Err(Error::RegistryFull(name)) if name == "mock"
        ));
    }

    #[test]
    fn open_through_wrapped_driver() {
        let backend = MockBackend::new(Capabilities::PINGER);
        let registry = registry_with_mock(&backend);
        let sink = Arc::new(InMemoryMetricsSink::default());
        let name = registry
            .register_wrapped(
                "mock",
                Options::builder().with_metrics_sink(sink.clone()).build(),
            )
            .unwrap();

        let conn = registry.open(&name, "mock://").unwrap();
        conn.as_pinger().unwrap().ping(&Context::new()).unwrap();

        assert_eq!(backend.calls(), vec!["driver.open", "conn.ping"]);
        assert_eq!(sink.calls().len(), 1);
    }
}
