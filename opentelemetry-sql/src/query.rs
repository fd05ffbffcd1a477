//! Instrumentation of query, on connections and on prepared statements.
use std::sync::Arc;

use opentelemetry::Context;

use crate::context::{LabelsContextExt, QueryContextExt};
use crate::driver::{NamedValue, Rows};
use crate::middleware::Middleware;
use crate::recorder::MethodRecorder;
use crate::rows::wrap_rows;
use crate::tracer::{MethodTracer, QueryTracer};
use crate::{Error, Result};

pub(crate) const METRIC_METHOD_QUERY: &str = "query";
pub(crate) const TRACE_METHOD_QUERY: &str = "query";
pub(crate) const METRIC_METHOD_STMT_QUERY: &str = "stmt.query";
pub(crate) const TRACE_METHOD_STMT_QUERY: &str = "query";

/// Shape of a query operation.
pub(crate) type QueryFn =
    Arc<dyn Fn(&Context, &str, &[NamedValue]) -> Result<Box<dyn Rows>> + Send + Sync>;

/// Query used when the backend has no fast path: always answers
/// [`Error::Skip`].
pub(crate) fn skipped_query() -> QueryFn {
    Arc::new(|_cx: &Context, _query: &str, _args: &[NamedValue]| Err(Error::Skip))
}

#[derive(Clone)]
pub(crate) struct QueryConfig {
    pub(crate) metric_method: &'static str,
    pub(crate) trace_method: &'static str,
    pub(crate) query_tracer: QueryTracer,
    pub(crate) trace_rows_next: bool,
    pub(crate) trace_rows_close: bool,
}

fn query_stats(recorder: MethodRecorder, method: &'static str) -> Middleware<QueryFn> {
    Arc::new(move |next: QueryFn| -> QueryFn {
        let recorder = recorder.clone();
        Arc::new(move |cx: &Context, query: &str, args: &[NamedValue]| {
            let recording = recorder.record(cx, method, cx.metric_labels());
            let result = next(cx, query, args);
            recording.end(result.as_ref().err());

            result
        })
    })
}

fn query_trace(
    tracer: MethodTracer,
    query_tracer: QueryTracer,
    method: &'static str,
) -> Middleware<QueryFn> {
    Arc::new(move |next: QueryFn| -> QueryFn {
        let tracer = tracer.clone();
        let query_tracer = Arc::clone(&query_tracer);
        Arc::new(move |cx: &Context, query: &str, args: &[NamedValue]| {
            let cx = cx.with_query(query);
            let (cx, span) = tracer.trace(&cx, method, &[]);
            let result = next(&cx, query, args);

            let mut attributes = cx.trace_labels().to_vec();
            attributes.extend(query_tracer(&cx, query, args));
            span.end(result.as_ref().err(), attributes);

            result
        })
    })
}

fn query_wrap_rows(
    tracer: MethodTracer,
    trace_rows_next: bool,
    trace_rows_close: bool,
) -> Middleware<QueryFn> {
    Arc::new(move |next: QueryFn| -> QueryFn {
        let tracer = tracer.clone();
        Arc::new(move |cx: &Context, query: &str, args: &[NamedValue]| {
            let rows = next(cx, query, args)?;
            let should_trace = tracer.should_trace(cx).should_trace;

            Ok(wrap_rows(
                cx,
                rows,
                &tracer,
                should_trace && trace_rows_next,
                should_trace && trace_rows_close,
            ))
        })
    })
}

pub(crate) fn query_middlewares(
    recorder: &MethodRecorder,
    tracer: Option<&MethodTracer>,
    config: &QueryConfig,
) -> Vec<Middleware<QueryFn>> {
    let mut middlewares = Vec::with_capacity(3);
    middlewares.push(query_stats(recorder.clone(), config.metric_method));

    let Some(tracer) = tracer else {
        return middlewares;
    };

    middlewares.push(query_trace(
        tracer.clone(),
        Arc::clone(&config.query_tracer),
        config.trace_method,
    ));

    if config.trace_rows_next || config.trace_rows_close {
        middlewares.push(query_wrap_rows(
            tracer.clone(),
            config.trace_rows_next,
            config.trace_rows_close,
        ));
    }

    middlewares
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{Status, TraceContextExt, Tracer, TracerProvider};
    use opentelemetry::KeyValue;

    use super::*;
    use crate::capability::Capabilities;
    use crate::driver::Value;
    use crate::middleware::chain;
    use crate::testing::{test_recorder, test_tracer, MockBackend};
    use crate::tracer::trace_query_without_args;

    fn config(trace_rows: bool) -> QueryConfig {
        QueryConfig {
            metric_method: METRIC_METHOD_STMT_QUERY,
            trace_method: TRACE_METHOD_STMT_QUERY,
            query_tracer: Arc::new(trace_query_without_args),
            trace_rows_next: trace_rows,
            trace_rows_close: trace_rows,
        }
    }

    fn query_backend(backend: &MockBackend) -> QueryFn {
        let backend = backend.clone();
        Arc::new(move |_cx: &Context, _query: &str, _args: &[NamedValue]| Ok(backend.rows()))
    }

    #[test]
    fn error_is_recorded_on_metric_and_span() {
        let (sink, recorder) = test_recorder();
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer).with_allow_root(true);
        let failing: QueryFn = Arc::new(|_cx: &Context, _query: &str, _args: &[NamedValue]| {
            Err(Error::from("query error"))
        });
        let query = chain(
            &query_middlewares(&recorder, Some(&tracer), &config(false)),
            failing,
        );

        let err = query(&Context::new(), "SELECT 1", &[]).err().unwrap();

        assert_eq!(err.to_string(), "query error");
        assert_eq!(
            sink.calls()[0].attributes,
            vec![
                KeyValue::new("db.operation", "stmt.query"),
                KeyValue::new("db.sql.status", "ERROR"),
                KeyValue::new("db.sql.error", "query error"),
            ]
        );
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "sql:query");
        assert_eq!(spans[0].status, Status::error("query error"));
    }

    #[test]
    fn trace_labels_are_added_at_end() {
        let (_sink, recorder) = test_recorder();
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let backend = MockBackend::new(Capabilities::empty());
        let query = chain(
            &query_middlewares(&recorder, Some(&tracer), &config(false)),
            query_backend(&backend),
        );
        let cx = Context::new()
            .with_span(provider.tracer("test").start("parent"))
            .with_trace_labels([KeyValue::new("tenant", "acme")]);

        query(&cx, "SELECT 1", &[]).unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(
            spans[0].attributes,
            vec![
                KeyValue::new("db.operation", "query"),
                KeyValue::new("tenant", "acme"),
                KeyValue::new("db.statement", "SELECT 1"),
            ]
        );
    }

    #[test]
    fn rows_are_traced_under_root_span() {
        let (_sink, recorder) = test_recorder();
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer).with_allow_root(true);
        let backend = MockBackend::new(Capabilities::empty())
            .with_rows(vec!["id"], vec![vec![Value::I64(1)], vec![Value::I64(2)]]);
        let query = chain(
            &query_middlewares(&recorder, Some(&tracer), &config(true)),
            query_backend(&backend),
        );

        let rows = query(&Context::new(), "SELECT id FROM data", &[]).unwrap();
        let mut dest = [Value::Null];
        while rows.next(&mut dest).unwrap() {}
        rows.close().unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        let names: Vec<_> = spans.iter().map(|s| s.name.to_string()).collect();
        assert_eq!(
            names,
            vec!["sql:query", "sql:rows_next", "sql:rows_next", "sql:rows_next", "sql:rows_close"]
        );

        let query_span = &spans[0];
        assert!(spans[1..]
            .iter()
            .all(|s| s.parent_span_id == query_span.span_context.span_id()));
    }

    #[test]
    fn rows_untouched_when_not_traced() {
        let (_sink, recorder) = test_recorder();
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let backend = MockBackend::new(Capabilities::empty());
        let query = chain(
            &query_middlewares(&recorder, Some(&tracer), &config(true)),
            query_backend(&backend),
        );

        let rows = query(&Context::new(), "SELECT 1", &[]).unwrap();
        rows.close().unwrap();

        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }
}
