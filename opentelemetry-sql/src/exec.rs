//! Instrumentation of exec, on connections and on prepared statements.
use std::sync::Arc;

use opentelemetry::Context;

use crate::context::{LabelsContextExt, QueryContextExt};
use crate::driver::{ExecResult, NamedValue};
use crate::middleware::Middleware;
use crate::recorder::MethodRecorder;
use crate::result::wrap_result;
use crate::tracer::{MethodTracer, QueryTracer};
use crate::{Error, Result};

pub(crate) const METRIC_METHOD_EXEC: &str = "exec";
pub(crate) const TRACE_METHOD_EXEC: &str = "exec";
pub(crate) const METRIC_METHOD_STMT_EXEC: &str = "stmt.exec";
pub(crate) const TRACE_METHOD_STMT_EXEC: &str = "exec";

/// Shape of an exec operation.
pub(crate) type ExecFn =
    Arc<dyn Fn(&Context, &str, &[NamedValue]) -> Result<Box<dyn ExecResult>> + Send + Sync>;

/// Exec used when the backend has no fast path: always answers
/// [`Error::Skip`].
pub(crate) fn skipped_exec() -> ExecFn {
    Arc::new(|_cx: &Context, _query: &str, _args: &[NamedValue]| Err(Error::Skip))
}

#[derive(Clone)]
pub(crate) struct ExecConfig {
    pub(crate) metric_method: &'static str,
    pub(crate) trace_method: &'static str,
    pub(crate) query_tracer: QueryTracer,
    pub(crate) trace_last_insert_id: bool,
    pub(crate) trace_rows_affected: bool,
}

fn exec_stats(recorder: MethodRecorder, method: &'static str) -> Middleware<ExecFn> {
    Arc::new(move |next: ExecFn| -> ExecFn {
        let recorder = recorder.clone();
        Arc::new(move |cx: &Context, query: &str, args: &[NamedValue]| {
            let recording = recorder.record(cx, method, cx.metric_labels());
            let result = next(cx, query, args);
            recording.end(result.as_ref().err());

            result
        })
    })
}

fn exec_trace(
    tracer: MethodTracer,
    query_tracer: QueryTracer,
    method: &'static str,
) -> Middleware<ExecFn> {
    Arc::new(move |next: ExecFn| -> ExecFn {
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

fn exec_wrap_result(
    tracer: MethodTracer,
    trace_last_insert_id: bool,
    trace_rows_affected: bool,
) -> Middleware<ExecFn> {
    Arc::new(move |next: ExecFn| -> ExecFn {
        let tracer = tracer.clone();
        Arc::new(move |cx: &Context, query: &str, args: &[NamedValue]| {
            let result = next(cx, query, args)?;
            let should_trace = tracer.should_trace(cx).should_trace;

            Ok(wrap_result(
                cx,
                result,
                &tracer,
                should_trace && trace_last_insert_id,
                should_trace && trace_rows_affected,
            ))
        })
    })
}

pub(crate) fn exec_middlewares(
    recorder: &MethodRecorder,
    tracer: Option<&MethodTracer>,
    config: &ExecConfig,
) -> Vec<Middleware<ExecFn>> {
    let mut middlewares = Vec::with_capacity(3);
    middlewares.push(exec_stats(recorder.clone(), config.metric_method));

    let Some(tracer) = tracer else {
        return middlewares;
    };

    middlewares.push(exec_trace(
        tracer.clone(),
        Arc::clone(&config.query_tracer),
        config.trace_method,
    ));

    if config.trace_last_insert_id || config.trace_rows_affected {
        middlewares.push(exec_wrap_result(
            tracer.clone(),
            config.trace_last_insert_id,
            config.trace_rows_affected,
        ));
    }

    middlewares
}
