//! Facade over connections.
use std::fmt;
use std::sync::Arc;

use opentelemetry::{otel_debug, Context};

use crate::begin::{begin_middlewares, ensure_begin, BeginFn};
use crate::capability::Capabilities;
use crate::driver::{
    Conn, ConnBeginTx, ConnPrepareContext, ExecResult, ExecerContext, NamedValue,
    NamedValueChecker, Pinger, QueryerContext, Rows, SessionResetter, Stmt, Tx, TxOptions,
};
use crate::exec::{
    exec_middlewares, skipped_exec, ExecConfig, ExecFn, METRIC_METHOD_EXEC,
    METRIC_METHOD_STMT_EXEC, TRACE_METHOD_EXEC, TRACE_METHOD_STMT_EXEC,
};
use crate::middleware::{chain, Middleware};
use crate::options::Options;
use crate::ping::{noop_ping, ping_middlewares, PingFn};
use crate::prepare::{ensure_prepare, prepare_middlewares, PrepareFn};
use crate::query::{
    query_middlewares, skipped_query, QueryConfig, QueryFn, METRIC_METHOD_QUERY,
    METRIC_METHOD_STMT_QUERY, TRACE_METHOD_QUERY, TRACE_METHOD_STMT_QUERY,
};
use crate::recorder::{InstrumentSink, MethodRecorder};
use crate::statement::StmtMiddlewares;
use crate::tracer::MethodTracer;
use crate::{Error, Result};

/// Middleware chains shared by every connection of a wrapped driver.
///
/// Built once from [`Options`] and reused for each connection.
pub(crate) struct ConnConfig {
    ping: Vec<Middleware<PingFn>>,
    exec: Vec<Middleware<ExecFn>>,
    query: Vec<Middleware<QueryFn>>,
    begin: Vec<Middleware<BeginFn>>,
    prepare: Vec<Middleware<PrepareFn>>,
}

impl fmt::Debug for ConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnConfig")
            .field("ping", &self.ping.len())
            .field("exec", &self.exec.len())
            .field("query", &self.query.len())
            .field("begin", &self.begin.len())
            .field("prepare", &self.prepare.len())
            .finish()
    }
}

impl ConnConfig {
    pub(crate) fn new(options: Options) -> Self {
        let scope = crate::options::instrumentation_scope();
        let trace = options.trace;

        let tracer = options
            .tracer
            .unwrap_or_else(|| Arc::new(opentelemetry::global::tracer_with_scope(scope.clone())));
        let tracer = MethodTracer::new(tracer)
            .with_allow_root(trace.allow_root)
            .with_attributes(options.default_attributes.clone())
            .with_span_name_formatter(options.span_name_formatter)
            .with_error_to_status(options.error_to_status);

        let sink = options.metrics_sink.unwrap_or_else(|| {
            Arc::new(InstrumentSink::new(&opentelemetry::global::meter_with_scope(
                scope,
            )))
        });
        let recorder = MethodRecorder::new(sink, options.default_attributes);
        let query_tracer = options.query_tracer;

        let exec_config = |metric_method, trace_method| ExecConfig {
            metric_method,
            trace_method,
            query_tracer: Arc::clone(&query_tracer),
            trace_last_insert_id: trace.last_insert_id,
            trace_rows_affected: trace.rows_affected,
        };
        let query_config = |metric_method, trace_method| QueryConfig {
            metric_method,
            trace_method,
            query_tracer: Arc::clone(&query_tracer),
            trace_rows_next: trace.rows_next,
            trace_rows_close: trace.rows_close,
        };

        let stmt = StmtMiddlewares {
            exec: exec_middlewares(
                &recorder,
                Some(&tracer),
                &exec_config(METRIC_METHOD_STMT_EXEC, TRACE_METHOD_STMT_EXEC),
            )
            .into(),
            query: query_middlewares(
                &recorder,
                Some(&tracer),
                &query_config(METRIC_METHOD_STMT_QUERY, TRACE_METHOD_STMT_QUERY),
            )
            .into(),
        };

        ConnConfig {
            ping: ping_middlewares(&recorder, trace.ping.then_some(&tracer)),
            exec: exec_middlewares(
                &recorder,
                Some(&tracer),
                &exec_config(METRIC_METHOD_EXEC, TRACE_METHOD_EXEC),
            ),
            query: query_middlewares(
                &recorder,
                Some(&tracer),
                &query_config(METRIC_METHOD_QUERY, TRACE_METHOD_QUERY),
            ),
            begin: begin_middlewares(&recorder, &tracer),
            prepare: prepare_middlewares(&recorder, &tracer, &query_tracer, &stmt),
        }
    }
}

/// Instrumented connection.
///
/// Answers the same capability checks as the connection it wraps. Calls to
/// capabilities the wrapped connection lacks get neutral answers: `ping`
/// succeeds, exec and query answer [`Error::Skip`].
pub struct WrappedConn {
    parent: Arc<dyn Conn>,
    capabilities: Capabilities,
    ping: PingFn,
    exec: ExecFn,
    query: QueryFn,
    begin: BeginFn,
    prepare: PrepareFn,
}

impl fmt::Debug for WrappedConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedConn")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl WrappedConn {
    pub(crate) fn new(parent: Box<dyn Conn>, config: &ConnConfig) -> Self {
        let parent: Arc<dyn Conn> = Arc::from(parent);
        let capabilities = Capabilities::of_conn(parent.as_ref());

        let ping = if capabilities.contains(Capabilities::PINGER) {
            let parent = Arc::clone(&parent);
            chain(
                &config.ping,
                Arc::new(move |cx: &Context| match parent.as_pinger() {
                    Some(pinger) => pinger.ping(cx),
                    None => Ok(()),
                }) as PingFn,
            )
        } else {
            noop_ping()
        };

        let exec = if capabilities.contains(Capabilities::EXECER_CONTEXT) {
            let parent = Arc::clone(&parent);
            chain(
                &config.exec,
                Arc::new(move |cx: &Context, query: &str, args: &[NamedValue]| {
                    match parent.as_execer_context() {
                        Some(execer) => execer.exec_context(cx, query, args),
                        None => Err(Error::Skip),
                    }
                }) as ExecFn,
            )
        } else {
            skipped_exec()
        };

        let query = if capabilities.contains(Capabilities::QUERYER_CONTEXT) {
            let parent = Arc::clone(&parent);
            chain(
                &config.query,
                Arc::new(move |cx: &Context, query: &str, args: &[NamedValue]| {
                    match parent.as_queryer_context() {
                        Some(queryer) => queryer.query_context(cx, query, args),
                        None => Err(Error::Skip),
                    }
                }) as QueryFn,
            )
        } else {
            skipped_query()
        };

        let begin = chain(&config.begin, ensure_begin(Arc::clone(&parent)));
        let prepare = chain(&config.prepare, ensure_prepare(Arc::clone(&parent)));

        otel_debug!(
            name: "Conn.Wrapped",
            capabilities = capabilities.to_string()
        );

        WrappedConn {
            parent,
            capabilities,
            ping,
            exec,
            query,
            begin,
            prepare,
        }
    }

    /// Optional capabilities of the wrapped connection.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

impl Conn for WrappedConn {
    fn prepare(&self, query: &str) -> Result<Box<dyn Stmt>> {
        (self.prepare)(&Context::new(), query)
    }

    fn begin(&self) -> Result<Box<dyn Tx>> {
        (self.begin)(&Context::new(), &TxOptions::default())
    }

    fn close(&self) -> Result<()> {
        self.parent.close()
    }

    fn as_pinger(&self) -> Option<&dyn Pinger> {
        self.capabilities
            .contains(Capabilities::PINGER)
            .then_some(self as &dyn Pinger)
    }

    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        self.capabilities
            .contains(Capabilities::EXECER_CONTEXT)
            .then_some(self as &dyn ExecerContext)
    }

    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        self.capabilities
            .contains(Capabilities::QUERYER_CONTEXT)
            .then_some(self as &dyn QueryerContext)
    }

    fn as_prepare_context(&self) -> Option<&dyn ConnPrepareContext> {
        self.capabilities
            .contains(Capabilities::PREPARE_CONTEXT)
            .then_some(self as &dyn ConnPrepareContext)
    }

    fn as_begin_tx(&self) -> Option<&dyn ConnBeginTx> {
        self.capabilities
            .contains(Capabilities::BEGIN_TX)
            .then_some(self as &dyn ConnBeginTx)
    }

    fn as_named_value_checker(&self) -> Option<&dyn NamedValueChecker> {
        self.capabilities
            .contains(Capabilities::NAMED_VALUE_CHECKER)
            .then_some(self as &dyn NamedValueChecker)
    }

    fn as_session_resetter(&self) -> Option<&dyn SessionResetter> {
        self.capabilities
            .contains(Capabilities::SESSION_RESETTER)
            .then_some(self as &dyn SessionResetter)
    }
}

impl Pinger for WrappedConn {
    fn ping(&self, cx: &Context) -> Result<()> {
        (self.ping)(cx)
    }
}

impl ExecerContext for WrappedConn {
    fn exec_context(
        &self,
        cx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>> {
        (self.exec)(cx, query, args)
    }
}

impl QueryerContext for WrappedConn {
    fn query_context(&self, cx: &Context, query: &str, args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        (self.query)(cx, query, args)
    }
}

impl ConnPrepareContext for WrappedConn {
    fn prepare_context(&self, cx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
        (self.prepare)(cx, query)
    }
}

impl ConnBeginTx for WrappedConn {
    fn begin_tx(&self, cx: &Context, opts: &TxOptions) -> Result<Box<dyn Tx>> {
        (self.begin)(cx, opts)
    }
}

impl NamedValueChecker for WrappedConn {
    fn check_named_value(&self, value: &mut NamedValue) -> Result<()> {
        match self.parent.as_named_value_checker() {
            Some(checker) => checker.check_named_value(value),
            None => Err(Error::Skip),
        }
    }
}

impl SessionResetter for WrappedConn {
    fn reset_session(&self, cx: &Context) -> Result<()> {
        match self.parent.as_session_resetter() {
            Some(resetter) => resetter.reset_session(cx),
            None => Ok(()),
        }
    }
}
