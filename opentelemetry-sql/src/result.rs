//! Tracing of exec result accessors.
use opentelemetry::Context;

use crate::context::span_context_only;
use crate::driver::ExecResult;
use crate::tracer::MethodTracer;
use crate::Result;

const TRACE_METHOD_LAST_INSERT_ID: &str = "last_insert_id";
const TRACE_METHOD_ROWS_AFFECTED: &str = "rows_affected";

struct TracedResult {
    parent: Box<dyn ExecResult>,
    cx: Context,
    tracer: MethodTracer,
    trace_last_insert_id: bool,
    trace_rows_affected: bool,
}

impl TracedResult {
    fn traced(&self, method: &'static str, f: impl FnOnce() -> Result<i64>) -> Result<i64> {
        let (_cx, span) = self.tracer.must_trace(&self.cx, method, &[]);
        let result = f();
        span.end(result.as_ref().err(), []);

        result
    }
}

impl ExecResult for TracedResult {
    fn last_insert_id(&self) -> Result<i64> {
        if !self.trace_last_insert_id {
            return self.parent.last_insert_id();
        }

        self.traced(TRACE_METHOD_LAST_INSERT_ID, || self.parent.last_insert_id())
    }

    fn rows_affected(&self) -> Result<i64> {
        if !self.trace_rows_affected {
            return self.parent.rows_affected();
        }

        self.traced(TRACE_METHOD_ROWS_AFFECTED, || self.parent.rows_affected())
    }
}

/// Wraps `parent` so the enabled accessors get their own span, parented by
/// the span of `cx`. Returns `parent` itself when nothing is traced.
pub(crate) fn wrap_result(
    cx: &Context,
    parent: Box<dyn ExecResult>,
    tracer: &MethodTracer,
    trace_last_insert_id: bool,
    trace_rows_affected: bool,
) -> Box<dyn ExecResult> {
    if !trace_last_insert_id && !trace_rows_affected {
        return parent;
    }

    Box::new(TracedResult {
        parent,
        cx: span_context_only(cx),
        tracer: tracer.clone(),
        trace_last_insert_id,
        trace_rows_affected,
    })
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{Status, TraceContextExt, Tracer, TracerProvider};

    use super::*;
    use crate::testing::{test_tracer, MockBackend, Operation};
    use crate::capability::Capabilities;

    #[test]
    fn only_enabled_accessor_is_traced() {
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let cx = Context::new().with_span(provider.tracer("test").start("parent"));
        let backend = MockBackend::new(Capabilities::empty());

        let result = wrap_result(&cx, backend.result(), &tracer, false, true);
        assert_eq!(result.last_insert_id().unwrap(), backend.last_insert_id());
        assert_eq!(result.rows_affected().unwrap(), backend.rows_affected());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "sql:rows_affected");
        assert_eq!(spans[0].parent_span_id, cx.span().span_context().span_id());
    }

    #[test]
    fn accessor_error_is_recorded() {
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let cx = Context::new().with_span(provider.tracer("test").start("parent"));
        let backend = MockBackend::new(Capabilities::empty())
            .with_error(Operation::LastInsertId, "not supported");

        let result = wrap_result(&cx, backend.result(), &tracer, true, false);
        let err = result.last_insert_id().unwrap_err();

        assert_eq!(err.to_string(), "not supported");
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].status, Status::error("not supported"));
    }

    #[test]
    fn returned_as_is_when_not_traced() {
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let backend = MockBackend::new(Capabilities::empty());

        let result = wrap_result(&Context::new(), backend.result(), &tracer, false, false);
        result.rows_affected().unwrap();

        assert!(exporter.get_finished_spans().unwrap().is_empty());
        assert_eq!(backend.calls(), vec!["result.rows_affected"]);
    }
}
