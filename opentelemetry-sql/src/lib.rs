//! # OpenTelemetry SQL
//!
//! Instrumentation for SQL database drivers. A driver implementing the
//! traits of [`driver`] is wrapped with [`wrap_driver`]; every connection it
//! opens then records the latency and the number of calls of each database
//! operation, and traces them as client spans.
//!
//! A wrapped object exposes exactly the optional capabilities of the object
//! it wraps, so code probing for a fast path (`as_execer_context`,
//! `as_begin_tx`, ...) sees the same answers with and without
//! instrumentation.
//!
//! ## Getting started
//!
//! ```
//! use std::sync::Arc;
//!
//! use opentelemetry::{Context, KeyValue};
//! use opentelemetry_sql::driver::{Conn, Driver, Pinger, Stmt, Tx};
//! use opentelemetry_sql::{wrap_driver, LabelsContextExt, Options, Result};
//!
//! struct MyConn;
//!
//! impl Conn for MyConn {
//!     fn prepare(&self, _query: &str) -> Result<Box<dyn Stmt>> {
//!         unimplemented!()
//!     }
//!     fn close(&self) -> Result<()> {
//!         Ok(())
//!     }
//!     fn begin(&self) -> Result<Box<dyn Tx>> {
//!         unimplemented!()
//!     }
//!     fn as_pinger(&self) -> Option<&dyn Pinger> {
//!         Some(self)
//!     }
//! }
//!
//! impl Pinger for MyConn {
//!     fn ping(&self, _cx: &Context) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyDriver;
//!
//! impl Driver for MyDriver {
//!     fn open(&self, _name: &str) -> Result<Box<dyn Conn>> {
//!         Ok(Box::new(MyConn))
//!     }
//! }
//!
//! let driver = wrap_driver(
//!     Arc::new(MyDriver),
//!     Options::builder()
//!         .with_system("mydb")
//!         .trace_query_without_args()
//!         .trace_ping()
//!         .build(),
//! );
//!
//! let conn = driver.open("mydb://localhost")?;
//! let cx = Context::new().with_labels([KeyValue::new("tenant", "acme")]);
//! conn.as_pinger().expect("ping is supported").ping(&cx)?;
//! # Ok::<(), opentelemetry_sql::Error>(())
//! ```
//!
//! ## Metrics
//!
//! Two instruments are recorded for every operation, with a `db.operation`
//! attribute naming it and a `db.sql.status` attribute telling whether it
//! failed:
//!
//! * `db.sql.client.latency`, a histogram of latencies in milliseconds.
//! * `db.sql.client.calls`, a counter of calls.
//!
//! ## Traces
//!
//! Spans are only started under an existing span, unless
//! [`OptionsBuilder::allow_root`] is set. Spans of `ping`, of reading rows
//! and of reading exec results are optional, see [`TraceOptions`].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

pub mod attribute;
pub mod capability;
pub mod driver;
pub mod recorder;
#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;
pub mod tracer;

mod begin;
mod conn;
mod context;
mod error;
mod exec;
mod middleware;
mod options;
mod ping;
mod prepare;
mod query;
mod registry;
mod result;
mod rows;
mod statement;
mod transaction;
mod wrap;


pub use capability::Capabilities;
pub use conn::WrappedConn;
pub use context::{Cancellation, CancellationContextExt, LabelsContextExt, QueryContextExt};
pub use error::{Error, Result};
pub use options::{Options, OptionsBuilder, TraceOptions};
pub use recorder::{InstrumentSink, MetricsSink};
pub use registry::Registry;
pub use wrap::{wrap_driver, WrappedConnector, WrappedDriver};
