//! Test doubles: a scriptable in-memory backend and a metrics sink keeping
//! every measurement.
//!
//! Enabled for this crate's tests and by the `testing` feature.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use opentelemetry::{Context, KeyValue};

use crate::capability::Capabilities;
use crate::driver::{
    ColumnConverter, Conn, ConnBeginTx, ConnPrepareContext, Connector, Driver, DriverContext,
    ExecResult, ExecerContext, NamedValue, NamedValueChecker, Pinger, QueryerContext, Rows,
    RowsColumnTypeDatabaseTypeName, RowsColumnTypeLength, RowsColumnTypeNullable,
    RowsColumnTypePrecisionScale, RowsColumnTypeScanType, RowsNextResultSet, SessionResetter,
    Stmt, StmtExecContext, StmtQueryContext, Tx, TxOptions, Value, ValueKind,
};
use crate::recorder::MetricsSink;
use crate::{Error, Result};

/// Calls of the mock backend that can be scripted to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Operation {
    /// `Driver::open`.
    Open,
    /// `DriverContext::open_connector`.
    OpenConnector,
    /// `Connector::connect`.
    Connect,
    /// `Connector::close`.
    ConnectorClose,
    /// `Pinger::ping`.
    Ping,
    /// `ExecerContext::exec_context`.
    ExecContext,
    /// `QueryerContext::query_context`.
    QueryContext,
    /// `Conn::prepare`.
    Prepare,
    /// `ConnPrepareContext::prepare_context`.
    PrepareContext,
    /// `Conn::begin`.
    Begin,
    /// `ConnBeginTx::begin_tx`.
    BeginTx,
    /// `NamedValueChecker::check_named_value` on a connection.
    ConnCheckNamedValue,
    /// `SessionResetter::reset_session`.
    ResetSession,
    /// `Conn::close`.
    ConnClose,
    /// `Stmt::exec`.
    StmtExec,
    /// `StmtExecContext::exec_context`.
    StmtExecContext,
    /// `Stmt::query`.
    StmtQuery,
    /// `StmtQueryContext::query_context`.
    StmtQueryContext,
    /// `ColumnConverter::convert_column`.
    StmtConvertColumn,
    /// `NamedValueChecker::check_named_value` on a statement.
    StmtCheckNamedValue,
    /// `Stmt::close`.
    StmtClose,
    /// `Rows::next`.
    RowsNext,
    /// `RowsNextResultSet::next_result_set`.
    RowsNextResultSet,
    /// `Rows::close`.
    RowsClose,
    /// `Tx::commit`.
    Commit,
    /// `Tx::rollback`.
    Rollback,
    /// `ExecResult::last_insert_id`.
    LastInsertId,
    /// `ExecResult::rows_affected`.
    RowsAffected,
}

impl Operation {
    /// Name of the call, as recorded in [`MockBackend::calls`].
    pub fn name(self) -> &'static str {
        match self {
            Operation::Open => "driver.open",
            Operation::OpenConnector => "driver.open_connector",
            Operation::Connect => "connector.connect",
            Operation::ConnectorClose => "connector.close",
            Operation::Ping => "conn.ping",
            Operation::ExecContext => "conn.exec_context",
            Operation::QueryContext => "conn.query_context",
            Operation::Prepare => "conn.prepare",
            Operation::PrepareContext => "conn.prepare_context",
            Operation::Begin => "conn.begin",
            Operation::BeginTx => "conn.begin_tx",
            Operation::ConnCheckNamedValue => "conn.check_named_value",
            Operation::ResetSession => "conn.reset_session",
            Operation::ConnClose => "conn.close",
            Operation::StmtExec => "stmt.exec",
            Operation::StmtExecContext => "stmt.exec_context",
            Operation::StmtQuery => "stmt.query",
            Operation::StmtQueryContext => "stmt.query_context",
            Operation::StmtConvertColumn => "stmt.convert_column",
            Operation::StmtCheckNamedValue => "stmt.check_named_value",
            Operation::StmtClose => "stmt.close",
            Operation::RowsNext => "rows.next",
            Operation::RowsNextResultSet => "rows.next_result_set",
            Operation::RowsClose => "rows.close",
            Operation::Commit => "tx.commit",
            Operation::Rollback => "tx.rollback",
            Operation::LastInsertId => "result.last_insert_id",
            Operation::RowsAffected => "result.rows_affected",
        }
    }
}

#[derive(Clone, Debug)]
enum ScriptedError {
    Skip,
    BadConnection,
    Message(String),
}

impl ScriptedError {
    fn to_error(&self) -> Error {
        match self {
            ScriptedError::Skip => Error::Skip,
            ScriptedError::BadConnection => Error::BadConnection,
            ScriptedError::Message(message) => Error::Other(message.clone()),
        }
    }
}

impl From<Error> for ScriptedError {
    fn from(err: Error) -> Self {
        match err {
            Error::Skip => ScriptedError::Skip,
            Error::BadConnection => ScriptedError::BadConnection,
            err => ScriptedError::Message(err.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
struct MockConfig {
    driver_capabilities: Capabilities,
    conn_capabilities: Capabilities,
    stmt_capabilities: Capabilities,
    rows_capabilities: Capabilities,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    last_insert_id: i64,
    rows_affected: i64,
}

#[derive(Debug, Default)]
struct MockState {
    errors: Mutex<HashMap<Operation, ScriptedError>>,
    calls: Mutex<Vec<&'static str>>,
    last_tx_options: Mutex<Option<TxOptions>>,
}

/// An in-memory backend whose objects implement exactly the configured
/// capabilities.
///
/// Every object handed out records its calls in the shared call log, see
/// [`calls`](Self::calls), and fails the calls scripted with
/// [`with_error`](Self::with_error).
#[derive(Clone, Debug)]
pub struct MockBackend {
    config: Arc<MockConfig>,
    state: Arc<MockState>,
}

impl MockBackend {
    /// Creates a backend whose connections have `conn_capabilities`.
    ///
    /// Drivers, statements and rows have no optional capability until
    /// configured otherwise.
    pub fn new(conn_capabilities: Capabilities) -> Self {
        MockBackend {
            config: Arc::new(MockConfig {
                driver_capabilities: Capabilities::empty(),
                conn_capabilities,
                stmt_capabilities: Capabilities::empty(),
                rows_capabilities: Capabilities::empty(),
                columns: vec!["id".to_string()],
                rows: Vec::new(),
                last_insert_id: 42,
                rows_affected: 1,
            }),
            state: Arc::new(MockState::default()),
        }
    }

    /// Sets the capabilities of drivers.
    pub fn with_driver_capabilities(mut self, capabilities: Capabilities) -> Self {
        Arc::make_mut(&mut self.config).driver_capabilities = capabilities;
        self
    }

    /// Sets the capabilities of statements.
    pub fn with_stmt_capabilities(mut self, capabilities: Capabilities) -> Self {
        Arc::make_mut(&mut self.config).stmt_capabilities = capabilities;
        self
    }

    /// Sets the capabilities of rows.
    pub fn with_rows_capabilities(mut self, capabilities: Capabilities) -> Self {
        Arc::make_mut(&mut self.config).rows_capabilities = capabilities;
        self
    }

    /// Sets the rows returned by every query.
    pub fn with_rows(mut self, columns: Vec<&str>, rows: Vec<Vec<Value>>) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.columns = columns.into_iter().map(str::to_string).collect();
        config.rows = rows;
        self
    }

    /// Sets the values reported by exec results.
    pub fn with_results(mut self, last_insert_id: i64, rows_affected: i64) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.last_insert_id = last_insert_id;
        config.rows_affected = rows_affected;
        self
    }

    /// Makes every call of `operation` fail with `err`.
    pub fn with_error(self, operation: Operation, err: impl Into<Error>) -> Self {
        if let Ok(mut errors) = self.state.errors.lock() {
            errors.insert(operation, ScriptedError::from(err.into()));
        }
        self
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Options of the last transaction started with options.
    pub fn last_tx_options(&self) -> Option<TxOptions> {
        self.state
            .last_tx_options
            .lock()
            .ok()
            .and_then(|opts| *opts)
    }

    /// Column names of returned rows.
    pub fn columns(&self) -> Vec<String> {
        self.config.columns.clone()
    }

    /// Last insert id of exec results.
    pub fn last_insert_id(&self) -> i64 {
        self.config.last_insert_id
    }

    /// Rows affected of exec results.
    pub fn rows_affected(&self) -> i64 {
        self.config.rows_affected
    }

    /// A driver of this backend.
    pub fn driver(&self) -> MockDriver {
        MockDriver(self.clone())
    }

    /// A connector of this backend.
    pub fn connector(&self) -> MockConnector {
        MockConnector(self.clone())
    }

    /// A connection of this backend.
    pub fn conn(&self) -> MockConn {
        MockConn(self.clone())
    }

    /// A prepared statement of this backend.
    pub fn stmt(&self) -> Box<dyn Stmt> {
        Box::new(MockStmt(self.clone()))
    }

    /// Rows of this backend, positioned before the first row.
    pub fn rows(&self) -> Box<dyn Rows> {
        Box::new(MockRows {
            backend: self.clone(),
            cursor: AtomicUsize::new(0),
        })
    }

    /// A transaction of this backend.
    pub fn tx(&self) -> Box<dyn Tx> {
        Box::new(MockTx(self.clone()))
    }

    /// An exec result of this backend.
    pub fn result(&self) -> Box<dyn ExecResult> {
        Box::new(MockResult(self.clone()))
    }

    fn call(&self, operation: Operation) -> Result<()> {
        if let Ok(mut calls) = self.state.calls.lock() {
            calls.push(operation.name());
        }

        let scripted = self
            .state
            .errors
            .lock()
            .ok()
            .and_then(|errors| errors.get(&operation).cloned());
        match scripted {
            Some(err) => Err(err.to_error()),
            None => Ok(()),
        }
    }
}

/// Driver of a [`MockBackend`].
#[derive(Clone, Debug)]
pub struct MockDriver(MockBackend);

impl Driver for MockDriver {
    fn open(&self, _name: &str) -> Result<Box<dyn Conn>> {
        self.0.call(Operation::Open)?;
        Ok(Box::new(self.0.conn()))
    }

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        self.0
            .config
            .driver_capabilities
            .contains(Capabilities::DRIVER_CONTEXT)
            .then_some(self as &dyn DriverContext)
    }
}

impl DriverContext for MockDriver {
    fn open_connector(&self, _name: &str) -> Result<Box<dyn Connector>> {
        self.0.call(Operation::OpenConnector)?;
        Ok(Box::new(self.0.connector()))
    }
}

/// Connector of a [`MockBackend`].
#[derive(Clone, Debug)]
pub struct MockConnector(MockBackend);

impl Connector for MockConnector {
    fn connect(&self, _cx: &Context) -> Result<Box<dyn Conn>> {
        self.0.call(Operation::Connect)?;
        Ok(Box::new(self.0.conn()))
    }

    fn close(&self) -> Result<()> {
        self.0.call(Operation::ConnectorClose)
    }
}

/// Connection of a [`MockBackend`].
#[derive(Clone, Debug)]
pub struct MockConn(MockBackend);

impl MockConn {
    fn has(&self, capability: Capabilities) -> bool {
        self.0.config.conn_capabilities.contains(capability)
    }
}

impl Conn for MockConn {
    fn prepare(&self, _query: &str) -> Result<Box<dyn Stmt>> {
        self.0.call(Operation::Prepare)?;
        Ok(self.0.stmt())
    }

    fn begin(&self) -> Result<Box<dyn Tx>> {
        self.0.call(Operation::Begin)?;
        Ok(self.0.tx())
    }

    fn close(&self) -> Result<()> {
        self.0.call(Operation::ConnClose)
    }

    fn as_pinger(&self) -> Option<&dyn Pinger> {
        self.has(Capabilities::PINGER)
            .then_some(self as &dyn Pinger)
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        self.has(Capabilities::EXECER_CONTEXT)
            .then_some(self as &dyn ExecerContext)
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        self.has(Capabilities::QUERYER_CONTEXT)
            .then_some(self as &dyn QueryerContext)
    }

    fn as_prepare_context(&self) -> Option<&dyn ConnPrepareContext> {
        self.has(Capabilities::PREPARE_CONTEXT)
            .then_some(self as &dyn ConnPrepareContext)
    }

    fn as_begin_tx(&self) -> Option<&dyn ConnBeginTx> {
        self.has(Capabilities::BEGIN_TX)
            .then_some(self as &dyn ConnBeginTx)
    }

    fn as_named_value_checker(&self) -> Option<&dyn NamedValueChecker> {
        self.has(Capabilities::NAMED_VALUE_CHECKER)
            .then_some(self as &dyn NamedValueChecker)
    }

    fn as_session_resetter(&self) -> Option<&dyn SessionResetter> {
        self.has(Capabilities::SESSION_RESETTER)
            .then_some(self as &dyn SessionResetter)
    }
}

impl Pinger for MockConn {
    fn ping(&self, _cx: &Context) -> Result<()> {
        self.0.call(Operation::Ping)
    }
}

impl ExecerContext for MockConn {
    fn exec_context(
        &self,
        _cx: &Context,
        _query: &str,
        _args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>> {
        self.0.call(Operation::ExecContext)?;
        Ok(self.0.result())
    }
}

impl QueryerContext for MockConn {
    fn query_context(
        &self,
        _cx: &Context,
        _query: &str,
        _args: &[NamedValue],
    ) -> Result<Box<dyn Rows>> {
        self.0.call(Operation::QueryContext)?;
        Ok(self.0.rows())
    }
}

impl ConnPrepareContext for MockConn {
    fn prepare_context(&self, _cx: &Context, _query: &str) -> Result<Box<dyn Stmt>> {
        self.0.call(Operation::PrepareContext)?;
        Ok(self.0.stmt())
    }
}

impl ConnBeginTx for MockConn {
    fn begin_tx(&self, _cx: &Context, opts: &TxOptions) -> Result<Box<dyn Tx>> {
        self.0.call(Operation::BeginTx)?;
        if let Ok(mut last) = self.0.state.last_tx_options.lock() {
            *last = Some(*opts);
        }
        Ok(self.0.tx())
    }
}

impl NamedValueChecker for MockConn {
    fn check_named_value(&self, _value: &mut NamedValue) -> Result<()> {
        self.0.call(Operation::ConnCheckNamedValue)
    }
}

impl SessionResetter for MockConn {
    fn reset_session(&self, _cx: &Context) -> Result<()> {
        self.0.call(Operation::ResetSession)
    }
}

struct MockStmt(MockBackend);

impl MockStmt {
    fn has(&self, capability: Capabilities) -> bool {
        self.0.config.stmt_capabilities.contains(capability)
    }
}

impl Stmt for MockStmt {
    fn close(&self) -> Result<()> {
        self.0.call(Operation::StmtClose)
    }

    fn num_input(&self) -> Option<usize> {
        Some(1)
    }

    fn exec(&self, _args: &[Value]) -> Result<Box<dyn ExecResult>> {
        self.0.call(Operation::StmtExec)?;
        Ok(self.0.result())
    }

    fn query(&self, _args: &[Value]) -> Result<Box<dyn Rows>> {
        self.0.call(Operation::StmtQuery)?;
        Ok(self.0.rows())
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        self.has(Capabilities::STMT_EXEC_CONTEXT)
            .then_some(self as &dyn StmtExecContext)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        self.has(Capabilities::STMT_QUERY_CONTEXT)
            .then_some(self as &dyn StmtQueryContext)
    }

    fn as_column_converter(&self) -> Option<&dyn ColumnConverter> {
        self.has(Capabilities::COLUMN_CONVERTER)
            .then_some(self as &dyn ColumnConverter)
    }

    fn as_named_value_checker(&self) -> Option<&dyn NamedValueChecker> {
        self.has(Capabilities::NAMED_VALUE_CHECKER)
            .then_some(self as &dyn NamedValueChecker)
    }
}

impl StmtExecContext for MockStmt {
    fn exec_context(&self, _cx: &Context, _args: &[NamedValue]) -> Result<Box<dyn ExecResult>> {
        self.0.call(Operation::StmtExecContext)?;
        Ok(self.0.result())
    }
}

impl StmtQueryContext for MockStmt {
    fn query_context(&self, _cx: &Context, _args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        self.0.call(Operation::StmtQueryContext)?;
        Ok(self.0.rows())
    }
}

impl ColumnConverter for MockStmt {
    fn convert_column(&self, _index: usize, value: Value) -> Result<Value> {
        self.0.call(Operation::StmtConvertColumn)?;
        Ok(value)
    }
}

impl NamedValueChecker for MockStmt {
    fn check_named_value(&self, _value: &mut NamedValue) -> Result<()> {
        self.0.call(Operation::StmtCheckNamedValue)
    }
}

struct MockRows {
    backend: MockBackend,
    cursor: AtomicUsize,
}

impl MockRows {
    fn has(&self, capability: Capabilities) -> bool {
        self.backend.config.rows_capabilities.contains(capability)
    }
}

impl Rows for MockRows {
    fn columns(&self) -> Vec<String> {
        self.backend.columns()
    }

    fn close(&self) -> Result<()> {
        self.backend.call(Operation::RowsClose)
    }

    fn next(&self, dest: &mut [Value]) -> Result<bool> {
        self.backend.call(Operation::RowsNext)?;

        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        let Some(row) = self.backend.config.rows.get(index) else {
            return Ok(false);
        };
        for (slot, value) in dest.iter_mut().zip(row) {
            *slot = value.clone();
        }

        Ok(true)
    }

    fn as_next_result_set(&self) -> Option<&dyn RowsNextResultSet> {
        self.has(Capabilities::NEXT_RESULT_SET)
            .then_some(self as &dyn RowsNextResultSet)
    }

    fn as_column_type_database_type_name(&self) -> Option<&dyn RowsColumnTypeDatabaseTypeName> {
        self.has(Capabilities::COLUMN_TYPE_DATABASE_TYPE_NAME)
            .then_some(self as &dyn RowsColumnTypeDatabaseTypeName)
    }

    fn as_column_type_length(&self) -> Option<&dyn RowsColumnTypeLength> {
        self.has(Capabilities::COLUMN_TYPE_LENGTH)
            .then_some(self as &dyn RowsColumnTypeLength)
    }

    fn as_column_type_nullable(&self) -> Option<&dyn RowsColumnTypeNullable> {
        self.has(Capabilities::COLUMN_TYPE_NULLABLE)
            .then_some(self as &dyn RowsColumnTypeNullable)
    }

    fn as_column_type_precision_scale(&self) -> Option<&dyn RowsColumnTypePrecisionScale> {
        self.has(Capabilities::COLUMN_TYPE_PRECISION_SCALE)
            .then_some(self as &dyn RowsColumnTypePrecisionScale)
    }

    fn as_column_type_scan_type(&self) -> Option<&dyn RowsColumnTypeScanType> {
        self.has(Capabilities::COLUMN_TYPE_SCAN_TYPE)
            .then_some(self as &dyn RowsColumnTypeScanType)
    }
}

impl RowsNextResultSet for MockRows {
    fn has_next_result_set(&self) -> bool {
        false
    }

    fn next_result_set(&self) -> Result<bool> {
        self.backend.call(Operation::RowsNextResultSet)?;
        Ok(false)
    }
}

impl RowsColumnTypeDatabaseTypeName for MockRows {
    fn column_type_database_type_name(&self, _index: usize) -> String {
        "VARCHAR".to_string()
    }
}

impl RowsColumnTypeLength for MockRows {
    fn column_type_length(&self, _index: usize) -> Option<u64> {
        Some(255)
    }
}

impl RowsColumnTypeNullable for MockRows {
    fn column_type_nullable(&self, _index: usize) -> Option<bool> {
        Some(true)
    }
}

impl RowsColumnTypePrecisionScale for MockRows {
    fn column_type_precision_scale(&self, _index: usize) -> Option<(i64, i64)> {
        Some((10, 2))
    }
}

impl RowsColumnTypeScanType for MockRows {
    fn column_type_scan_type(&self, _index: usize) -> ValueKind {
        ValueKind::String
    }
}

struct MockTx(MockBackend);

impl Tx for MockTx {
    fn commit(&self) -> Result<()> {
        self.0.call(Operation::Commit)
    }

    fn rollback(&self) -> Result<()> {
        self.0.call(Operation::Rollback)
    }
}

/// Exec result of a [`MockBackend`].
#[derive(Clone, Debug)]
pub struct MockResult(MockBackend);

impl MockResult {
    /// A result of a fresh backend reporting the given values.
    pub fn new(last_insert_id: i64, rows_affected: i64) -> Self {
        MockResult(MockBackend::new(Capabilities::empty()).with_results(last_insert_id, rows_affected))
    }
}

impl ExecResult for MockResult {
    fn last_insert_id(&self) -> Result<i64> {
        self.0.call(Operation::LastInsertId)?;
        Ok(self.0.config.last_insert_id)
    }

    fn rows_affected(&self) -> Result<i64> {
        self.0.call(Operation::RowsAffected)?;
        Ok(self.0.config.rows_affected)
    }
}

/// One measurement kept by [`InMemoryMetricsSink`].
#[derive(Clone, Debug)]
pub struct Measurement<T> {
    /// Measured value.
    pub value: T,
    /// Attributes of the measurement.
    pub attributes: Vec<KeyValue>,
    /// Context the measurement was taken under.
    pub cx: Context,
}

/// A [`MetricsSink`] keeping every measurement in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    latencies: Mutex<Vec<Measurement<f64>>>,
    calls: Mutex<Vec<Measurement<u64>>>,
}

impl InMemoryMetricsSink {
    /// Recorded latencies, in milliseconds.
    pub fn latencies(&self) -> Vec<Measurement<f64>> {
        self.latencies
            .lock()
            .map(|latencies| latencies.clone())
            .unwrap_or_default()
    }

    /// Recorded call counts.
    pub fn calls(&self) -> Vec<Measurement<u64>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Values of the `db.operation` attribute of recorded calls, in order.
    pub fn operations(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|m| {
                m.attributes
                    .iter()
                    .find(|kv| kv.key == crate::attribute::DB_OPERATION)
                    .map(|kv| kv.value.to_string())
            })
            .collect()
    }

    /// Forgets every measurement.
    pub fn reset(&self) {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.clear();
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record_latency(&self, cx: &Context, millis: f64, attributes: &[KeyValue]) {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push(Measurement {
                value: millis,
                attributes: attributes.to_vec(),
                cx: cx.clone(),
            });
        }
    }

    fn count_call(&self, cx: &Context, calls: u64, attributes: &[KeyValue]) {
        if let Ok(mut recorded) = self.calls.lock() {
            recorded.push(Measurement {
                value: calls,
                attributes: attributes.to_vec(),
                cx: cx.clone(),
            });
        }
    }
}

#[cfg(test)]
pub(crate) fn test_recorder() -> (Arc<InMemoryMetricsSink>, crate::recorder::MethodRecorder) {
    let sink = Arc::new(InMemoryMetricsSink::default());
    let recorder = crate::recorder::MethodRecorder::new(sink.clone(), Vec::new());

    (sink, recorder)
}

#[cfg(test)]
pub(crate) fn test_tracer() -> (
    opentelemetry_sdk::trace::SdkTracerProvider,
    opentelemetry_sdk::trace::InMemorySpanExporter,
    opentelemetry::global::BoxedTracer,
) {
    use opentelemetry::trace::TracerProvider;

    let exporter = opentelemetry_sdk::trace::InMemorySpanExporter::default();
    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = opentelemetry::global::BoxedTracer::new(Box::new(
        provider.tracer("opentelemetry-sql-test"),
    ));

    (provider, exporter, tracer)
}
