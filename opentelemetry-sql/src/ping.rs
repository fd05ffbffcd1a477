//! Instrumentation of `ping`.
use std::sync::Arc;

use opentelemetry::Context;

use crate::context::LabelsContextExt;
use crate::middleware::Middleware;
use crate::recorder::MethodRecorder;
use crate::tracer::MethodTracer;
use crate::Result;

const METRIC_METHOD_PING: &str = "ping";
const TRACE_METHOD_PING: &str = "ping";

/// Shape of a ping operation.
pub(crate) type PingFn = Arc<dyn Fn(&Context) -> Result<()> + Send + Sync>;

/// Ping used when the backend cannot ping: always succeeds.
pub(crate) fn noop_ping() -> PingFn {
    Arc::new(|_cx: &Context| Ok(()))
}

fn ping_stats(recorder: MethodRecorder) -> Middleware<PingFn> {
    Arc::new(move |next: PingFn| -> PingFn {
        let recorder = recorder.clone();
        Arc::new(move |cx: &Context| {
            let recording = recorder.record(cx, METRIC_METHOD_PING, cx.metric_labels());
            let result = next(cx);
            recording.end(result.as_ref().err());

            result
        })
    })
}

fn ping_trace(tracer: MethodTracer) -> Middleware<PingFn> {
    Arc::new(move |next: PingFn| -> PingFn {
        let tracer = tracer.clone();
        Arc::new(move |cx: &Context| {
            let (cx, span) = tracer.trace(cx, TRACE_METHOD_PING, cx.trace_labels());
            let result = next(&cx);
            span.end(result.as_ref().err(), []);

            result
        })
    })
}

/// Metrics always, spans only when `tracer` is given.
pub(crate) fn ping_middlewares(
    recorder: &MethodRecorder,
    tracer: Option<&MethodTracer>,
) -> Vec<Middleware<PingFn>> {
    let mut middlewares = Vec::with_capacity(2);
    middlewares.push(ping_stats(recorder.clone()));

    if let Some(tracer) = tracer {
        middlewares.push(ping_trace(tracer.clone()));
    }

    middlewares
}
