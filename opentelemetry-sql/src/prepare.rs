//! Instrumentation of preparing statements.
use std::sync::Arc;

use opentelemetry::Context;

use crate::context::LabelsContextExt;
use crate::driver::{Conn, Stmt};
use crate::middleware::Middleware;
use crate::recorder::MethodRecorder;
use crate::statement::{wrap_stmt, StmtMiddlewares};
use crate::tracer::{MethodTracer, QueryTracer};
use crate::Result;

const METRIC_METHOD_PREPARE: &str = "prepare";
const TRACE_METHOD_PREPARE: &str = "prepare";

/// Shape of preparing a statement.
pub(crate) type PrepareFn = Arc<dyn Fn(&Context, &str) -> Result<Box<dyn Stmt>> + Send + Sync>;

/// Prepares statements on `conn`, with a context when it supports it.
pub(crate) fn ensure_prepare(conn: Arc<dyn Conn>) -> PrepareFn {
    Arc::new(move |cx: &Context, query: &str| match conn.as_prepare_context() {
        Some(prepare) => prepare.prepare_context(cx, query),
        None => conn.prepare(query),
    })
}

fn prepare_stats(recorder: MethodRecorder) -> Middleware<PrepareFn> {
    Arc::new(move |next: PrepareFn| -> PrepareFn {
        let recorder = recorder.clone();
        Arc::new(move |cx: &Context, query: &str| {
            let recording = recorder.record(cx, METRIC_METHOD_PREPARE, cx.metric_labels());
            let result = next(cx, query);
            recording.end(result.as_ref().err());

            result
        })
    })
}

fn prepare_trace(tracer: MethodTracer, query_tracer: QueryTracer) -> Middleware<PrepareFn> {
    Arc::new(move |next: PrepareFn| -> PrepareFn {
        let tracer = tracer.clone();
        let query_tracer = Arc::clone(&query_tracer);
        Arc::new(move |cx: &Context, query: &str| {
            let (cx, span) = tracer.trace(cx, TRACE_METHOD_PREPARE, cx.trace_labels());
            let result = next(&cx, query);
            span.end(result.as_ref().err(), query_tracer(&cx, query, &[]));

            result
        })
    })
}

fn prepare_wrap_stmt(middlewares: StmtMiddlewares) -> Middleware<PrepareFn> {
    Arc::new(move |next: PrepareFn| -> PrepareFn {
        let middlewares = middlewares.clone();
        Arc::new(move |cx: &Context, query: &str| {
            let stmt = next(cx, query)?;

            Ok(wrap_stmt(stmt, query, &middlewares))
        })
    })
}

/// Prepared statements are always wrapped, so that their exec and query
/// calls are measured whatever the tracing options.
pub(crate) fn prepare_middlewares(
    recorder: &MethodRecorder,
    tracer: &MethodTracer,
    query_tracer: &QueryTracer,
    stmt: &StmtMiddlewares,
) -> Vec<Middleware<PrepareFn>> {
    vec![
        prepare_stats(recorder.clone()),
        prepare_trace(tracer.clone(), Arc::clone(query_tracer)),
        prepare_wrap_stmt(stmt.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{Status, TraceContextExt, Tracer, TracerProvider};
    use opentelemetry::KeyValue;

    use super::*;
    use crate::capability::Capabilities;
    use crate::middleware::chain;
    use crate::testing::{test_recorder, test_tracer, MockBackend, Operation};
    use crate::tracer::trace_query_without_args;

    fn prepare_fn(backend: &MockBackend) -> PrepareFn {
        ensure_prepare(Arc::new(backend.conn()))
    }

    #[test]
    fn prefers_prepare_context() {
        let backend = MockBackend::new(Capabilities::PREPARE_CONTEXT);

        prepare_fn(&backend)(&Context::new(), "SELECT 1").unwrap();

        assert_eq!(backend.calls(), vec!["conn.prepare_context"]);
    }

    #[test]
    fn span_carries_query_without_args() {
        let (sink, recorder) = test_recorder();
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let query_tracer: QueryTracer = Arc::new(trace_query_without_args);
        let prepare = chain(
            &prepare_middlewares(&recorder, &tracer, &query_tracer, &StmtMiddlewares::default()),
            prepare_fn(&MockBackend::new(Capabilities::empty())),
        );
        let cx = Context::new().with_span(provider.tracer("test").start("parent"));

        prepare(&cx, "SELECT * FROM data").unwrap();

        assert_eq!(
            sink.calls()[0].attributes,
            vec![
                KeyValue::new("db.operation", "prepare"),
                KeyValue::new("db.sql.status", "OK"),
            ]
        );
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "sql:prepare");
        assert_eq!(
            spans[0].attributes,
            vec![
                KeyValue::new("db.operation", "prepare"),
                KeyValue::new("db.statement", "SELECT * FROM data"),
            ]
        );
    }

    #[test]
    fn failure_returns_backend_error() {
        let (sink, recorder) = test_recorder();
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer).with_allow_root(true);
        let backend = MockBackend::new(Capabilities::empty())
            .with_error(Operation::Prepare, "syntax error");
        let prepare = chain(
            &prepare_middlewares(
                &recorder,
                &tracer,
                &(Arc::new(trace_query_without_args) as QueryTracer),
                &StmtMiddlewares::default(),
            ),
            prepare_fn(&backend),
        );

        let err = prepare(&Context::new(), "SELEC 1").err().unwrap();

        assert_eq!(err.to_string(), "syntax error");
        assert_eq!(sink.calls().len(), 1);
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].status, Status::error("syntax error"));
    }
}
