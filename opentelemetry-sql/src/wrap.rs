//! Wrapping drivers and connectors.
use std::fmt;
use std::sync::Arc;

use opentelemetry::{otel_debug, Context};

use crate::capability::Capabilities;
use crate::conn::{ConnConfig, WrappedConn};
use crate::driver::{Conn, Connector, Driver, DriverContext};
use crate::options::Options;
use crate::{Error, Result};

/// Wraps `driver` so that every connection it opens is instrumented.
///
/// ```
/// use std::sync::Arc;
///
/// use opentelemetry_sql::driver::{Conn, Driver};
/// use opentelemetry_sql::{wrap_driver, Options, Result};
///
/// struct MyDriver;
///
/// impl Driver for MyDriver {
///     fn open(&self, _name: &str) -> Result<Box<dyn Conn>> {
///         unimplemented!()
///     }
/// }
///
/// let driver = wrap_driver(
///     Arc::new(MyDriver),
///     Options::builder().with_system("postgresql").build(),
/// );
/// assert!(driver.as_driver_context().is_none());
/// ```
pub fn wrap_driver(driver: Arc<dyn Driver>, options: Options) -> WrappedDriver {
    let capabilities = Capabilities::of_driver(driver.as_ref());

    otel_debug!(
        name: "Driver.Wrapped",
        capabilities = capabilities.to_string(),
        trace_options = format!("{:?}", options.trace)
    );

    WrappedDriver {
        parent: driver,
        capabilities,
        config: Arc::new(ConnConfig::new(options)),
    }
}

/// Instrumented driver, see [`wrap_driver`].
pub struct WrappedDriver {
    parent: Arc<dyn Driver>,
    capabilities: Capabilities,
    config: Arc<ConnConfig>,
}

impl fmt::Debug for WrappedDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedDriver")
            .field("capabilities", &self.capabilities)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WrappedDriver {
    /// Instruments a connection opened outside of this driver, with the
    /// options of this driver.
    pub fn wrap_conn(&self, conn: Box<dyn Conn>) -> WrappedConn {
        WrappedConn::new(conn, &self.config)
    }
}

impl Driver for WrappedDriver {
    fn open(&self, name: &str) -> Result<Box<dyn Conn>> {
        let conn = self.parent.open(name)?;

        Ok(Box::new(self.wrap_conn(conn)))
    }

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        self.capabilities
            .contains(Capabilities::DRIVER_CONTEXT)
            .then_some(self as &dyn DriverContext)
    }
}

impl DriverContext for WrappedDriver {
    fn open_connector(&self, name: &str) -> Result<Box<dyn Connector>> {
        let Some(driver) = self.parent.as_driver_context() else {
            return Err(Error::Other(
                "wrapped driver does not support connectors".to_string(),
            ));
        };

        Ok(Box::new(WrappedConnector {
            parent: driver.open_connector(name)?,
            config: Arc::clone(&self.config),
        }))
    }
}

/// Instrumented connector, returned by [`WrappedDriver`] when the wrapped
/// driver supports connectors.
pub struct WrappedConnector {
    parent: Box<dyn Connector>,
    config: Arc<ConnConfig>,
}

impl fmt::Debug for WrappedConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedConnector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WrappedConnector {
    /// Wraps a connector built outside of a driver.
    pub fn new(connector: Box<dyn Connector>, options: Options) -> Self {
        WrappedConnector {
            parent: connector,
            config: Arc::new(ConnConfig::new(options)),
        }
    }
}

impl Connector for WrappedConnector {
    fn connect(&self, cx: &Context) -> Result<Box<dyn Conn>> {
        let conn = self.parent.connect(cx)?;

        Ok(Box::new(WrappedConn::new(conn, &self.config)))
    }

    fn close(&self) -> Result<()> {
        self.parent.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use opentelemetry::trace::{TraceContextExt, Tracer, TracerProvider};

    use super::*;
    use crate::testing::{test_tracer, InMemoryMetricsSink, MockBackend, Operation};

    fn options(sink: &Arc<InMemoryMetricsSink>) -> Options {
        Options::builder().with_metrics_sink(sink.clone()).build()
    }

    #[test]
    fn open_wraps_connection() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let backend = MockBackend::new(Capabilities::PINGER | Capabilities::BEGIN_TX);
        let driver = wrap_driver(Arc::new(backend.driver()), options(&sink));

        let conn = driver.open("mock://").unwrap();

        assert!(conn.as_pinger().is_some());
        assert!(conn.as_begin_tx().is_some());
        assert!(conn.as_execer_context().is_none());
        conn.as_pinger().unwrap().ping(&Context::new()).unwrap();
        assert_eq!(backend.calls(), vec!["driver.open", "conn.ping"]);
        assert_eq!(sink.calls().len(), 1);
    }

    #[test]
    fn open_error_is_returned() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let backend = MockBackend::new(Capabilities::empty())
            .with_error(Operation::Open, Error::BadConnection);
        let driver = wrap_driver(Arc::new(backend.driver()), options(&sink));

        assert!(matches!(driver.open("mock://"), Err(Error::BadConnection)));
    }

    #[test]
    fn connector_connections_are_wrapped() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let (provider, exporter, _tracer) = test_tracer();
        let backend = MockBackend::new(Capabilities::EXECER_CONTEXT)
            .with_driver_capabilities(Capabilities::DRIVER_CONTEXT);
        let driver = wrap_driver(
            Arc::new(backend.driver()),
            Options::builder()
                .with_metrics_sink(sink.clone())
                .with_tracer_provider(&provider)
                .build(),
        );

        let connector = driver
            .as_driver_context()
            .unwrap()
            .open_connector("mock://")
            .unwrap();
        let cx = Context::new().with_span(provider.tracer("test").start("parent"));
        let conn = connector.connect(&cx).unwrap();
        conn.as_execer_context()
            .unwrap()
            .exec_context(&cx, "DELETE FROM data", &[])
            .unwrap();
        connector.close().unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                "driver.open_connector",
                "connector.connect",
                "conn.exec_context",
                "connector.close"
            ]
        );
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "sql:exec");
    }

    #[test]
    fn connector_requires_driver_context() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let backend = MockBackend::new(Capabilities::empty());
        let driver = wrap_driver(Arc::new(backend.driver()), options(&sink));

        assert!(driver.as_driver_context().is_none());
        assert!(driver.open_connector("mock://").is_err());
    }

    #[test]
    fn standalone_connector() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let backend = MockBackend::new(Capabilities::PINGER);
        let connector = WrappedConnector::new(Box::new(backend.connector()), options(&sink));

        let conn = connector.connect(&Context::new()).unwrap();
        conn.as_pinger().unwrap().ping(&Context::new()).unwrap();

        assert_eq!(sink.calls().len(), 1);
    }
}
