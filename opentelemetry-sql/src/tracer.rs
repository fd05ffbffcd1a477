//! Spans of instrumented operations.
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};

use crate::attribute::{self, DB_OPERATION, DB_STATEMENT};
use crate::driver::NamedValue;
use crate::Error;

/// Formats the name of a span from the operation being traced.
///
/// The context carries the query text for exec and query operations, see
/// [`QueryContextExt`](crate::QueryContextExt).
pub type SpanNameFormatter = Arc<dyn Fn(&Context, &str) -> String + Send + Sync>;

/// Maps the outcome of an operation to a span status.
pub type ErrorToStatus = Arc<dyn Fn(Option<&Error>) -> Status + Send + Sync>;

/// Produces the query related attributes of a span.
pub type QueryTracer = Arc<dyn Fn(&Context, &str, &[NamedValue]) -> Vec<KeyValue> + Send + Sync>;

/// Whether an operation should be traced under a given context.
///
/// `has_parent_span` implies `should_trace`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceDecision {
    /// The operation should get a span.
    pub should_trace: bool,
    /// The context already carries a valid span.
    pub has_parent_span: bool,
}

/// Starts and ends the spans of operations.
///
/// Operations are only traced under a context carrying a valid span, unless
/// root spans are allowed.
#[derive(Clone)]
pub struct MethodTracer {
    tracer: Arc<BoxedTracer>,
    format_span_name: SpanNameFormatter,
    error_to_status: ErrorToStatus,
    allow_root: bool,
    attributes: Arc<[KeyValue]>,
}

impl fmt::Debug for MethodTracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTracer")
            .field("allow_root", &self.allow_root)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl MethodTracer {
    /// Creates a tracer starting spans with `tracer`, with the default span
    /// name formatter and error classifier.
    pub fn new(tracer: impl Into<Arc<BoxedTracer>>) -> Self {
        MethodTracer {
            tracer: tracer.into(),
            format_span_name: Arc::new(format_span_name),
            error_to_status: Arc::new(span_status_from_error),
            allow_root: false,
            attributes: Vec::new().into(),
        }
    }

    /// Allows spans without a parent.
    pub fn with_allow_root(mut self, allow_root: bool) -> Self {
        self.allow_root = allow_root;
        self
    }

    /// Adds `attributes` to every span.
    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = attributes.into();
        self
    }

    /// Replaces the span name formatter.
    pub fn with_span_name_formatter(mut self, formatter: SpanNameFormatter) -> Self {
        self.format_span_name = formatter;
        self
    }

    /// Replaces the error classifier.
    pub fn with_error_to_status(mut self, error_to_status: ErrorToStatus) -> Self {
        self.error_to_status = error_to_status;
        self
    }

    /// Decides whether an operation running under `cx` is traced.
    pub fn should_trace(&self, cx: &Context) -> TraceDecision {
        let has_parent_span = cx.span().span_context().is_valid();

        TraceDecision {
            should_trace: self.allow_root || has_parent_span,
            has_parent_span,
        }
    }

    /// Traces `method` if [`should_trace`](Self::should_trace) allows it.
    ///
    /// The returned context is the one the operation should run under: the
    /// new span's context when a root span was started, `cx` itself
    /// otherwise.
    pub fn trace(&self, cx: &Context, method: &'static str, labels: &[KeyValue]) -> (Context, SpanEnd) {
        let decision = self.should_trace(cx);
        if !decision.should_trace {
            return (cx.clone(), SpanEnd::noop());
        }

        let (span_cx, end) = self.must_trace(cx, method, labels);
        if decision.has_parent_span {
            (cx.clone(), end)
        } else {
            (span_cx, end)
        }
    }

    /// Starts a span for `method` under `cx`, whatever the decision.
    pub fn must_trace(
        &self,
        cx: &Context,
        method: &'static str,
        labels: &[KeyValue],
    ) -> (Context, SpanEnd) {
        let mut attributes = Vec::with_capacity(self.attributes.len() + labels.len() + 1);
        attributes.extend_from_slice(&self.attributes);
        attributes.extend_from_slice(labels);
        attributes.push(KeyValue::new(DB_OPERATION, method));

        let span = self
            .tracer
            .span_builder((self.format_span_name)(cx, method))
            .with_kind(SpanKind::Client)
            .with_start_time(SystemTime::now())
            .with_attributes(attributes)
            .start_with_context(self.tracer.as_ref(), cx);
        let span_cx = cx.with_span(span);

        let end = SpanEnd(Some(ActiveSpan {
            cx: span_cx.clone(),
            error_to_status: Arc::clone(&self.error_to_status),
        }));

        (span_cx, end)
    }
}

struct ActiveSpan {
    cx: Context,
    error_to_status: ErrorToStatus,
}

/// Ends a span started by [`MethodTracer`].
#[must_use = "the span is only ended when `end` is called"]
pub struct SpanEnd(Option<ActiveSpan>);

impl fmt::Debug for SpanEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanEnd")
            .field("active", &self.0.is_some())
            .finish()
    }
}

impl SpanEnd {
    pub(crate) fn noop() -> Self {
        SpanEnd(None)
    }

    /// Ends the span with the outcome of the operation.
    ///
    /// `attributes` are added to the span. When the error classifier maps
    /// `err` to an error status the error is also recorded on the span.
    pub fn end<I>(self, err: Option<&Error>, attributes: I)
    where
        I: IntoIterator<Item = KeyValue>,
    {
        let Some(active) = self.0 else {
            return;
        };

        let span = active.cx.span();
        span.set_attributes(attributes);

        let status = (active.error_to_status)(err);
        let failed = matches!(status, Status::Error { .. });
        span.set_status(status);

        if let (true, Some(err)) = (failed, err) {
            span.record_error(err);
        }

        span.end_with_timestamp(SystemTime::now());
    }
}

/// Default span name: `sql:<method>`.
pub fn format_span_name(_cx: &Context, method: &str) -> String {
    format!("sql:{method}")
}

/// Default error classifier: any error is an error.
pub fn span_status_from_error(err: Option<&Error>) -> Status {
    match err {
        None => Status::Ok,
        Some(err) => Status::error(err.to_string()),
    }
}

/// Error classifier treating [`Error::Skip`] as success.
pub fn span_status_from_error_ignore_skip(err: Option<&Error>) -> Status {
    match err {
        None | Some(Error::Skip) => Status::Ok,
        Some(err) => Status::error(err.to_string()),
    }
}

/// Query tracer adding nothing.
pub fn trace_no_query(_cx: &Context, _query: &str, _args: &[NamedValue]) -> Vec<KeyValue> {
    Vec::new()
}

/// Query tracer adding the query text.
pub fn trace_query_without_args(_cx: &Context, query: &str, _args: &[NamedValue]) -> Vec<KeyValue> {
    vec![KeyValue::new(DB_STATEMENT, query.to_string())]
}

/// Query tracer adding the query text and every bound argument.
pub fn trace_query_with_args(_cx: &Context, query: &str, args: &[NamedValue]) -> Vec<KeyValue> {
    let mut attributes = Vec::with_capacity(1 + args.len());
    attributes.push(KeyValue::new(DB_STATEMENT, query.to_string()));
    attributes.extend(args.iter().map(attribute::from_named_value));

    attributes
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{SpanId, Tracer, TracerProvider};
    use rstest::rstest;

    use super::*;
    use crate::testing::test_tracer;

    #[rstest]
    #[case(false, false, false)]
    #[case(true, false, true)]
    #[case(false, true, true)]
    #[case(true, true, true)]
    fn decision(#[case] allow_root: bool, #[case] has_parent: bool, #[case] should_trace: bool) {
        let (provider, _exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer).with_allow_root(allow_root);

        let cx = if has_parent {
            Context::new().with_span(provider.tracer("test").start("parent"))
        } else {
            Context::new()
        };

        assert_eq!(
            tracer.should_trace(&cx),
            TraceDecision {
                should_trace,
                has_parent_span: has_parent,
            }
        );
    }

    #[test]
    fn no_span_without_parent() {
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);

        let (cx, end) = tracer.trace(&Context::new(), "ping", &[]);
        end.end(None, []);

        assert!(!cx.has_active_span());
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn child_span_keeps_parent_context() {
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer).with_attributes(vec![KeyValue::new("db.system", "test")]);
        let parent_cx = Context::new().with_span(provider.tracer("test").start("parent"));
        let parent_span_id = parent_cx.span().span_context().span_id();

        let (cx, end) = tracer.trace(&parent_cx, "exec", &[KeyValue::new("tenant", "acme")]);
        assert_eq!(cx.span().span_context().span_id(), parent_span_id);
        end.end(None, [KeyValue::new("db.statement", "DELETE FROM data")]);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);

        let span = &spans[0];
        assert_eq!(span.name, "sql:exec");
        assert_eq!(span.span_kind, SpanKind::Client);
        assert_eq!(span.parent_span_id, parent_span_id);
        assert_eq!(span.status, Status::Ok);
        assert_eq!(
            span.attributes,
            vec![
                KeyValue::new("db.system", "test"),
                KeyValue::new("tenant", "acme"),
                KeyValue::new("db.operation", "exec"),
                KeyValue::new("db.statement", "DELETE FROM data"),
            ]
        );
    }

    #[test]
    fn root_span_is_propagated() {
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer).with_allow_root(true);

        let (cx, end) = tracer.trace(&Context::new(), "query", &[]);
        let span_id = cx.span().span_context().span_id();
        end.end(None, []);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_context.span_id(), span_id);
        assert_eq!(spans[0].parent_span_id, SpanId::INVALID);
    }

    #[test]
    fn error_is_recorded() {
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer)
            .with_allow_root(true)
            .with_span_name_formatter(Arc::new(|_cx: &Context, method: &str| method.to_uppercase()));

        let (_cx, end) = tracer.must_trace(&Context::new(), "ping", &[]);
        end.end(Some(&Error::from("ping error")), []);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].name, "PING");
        assert_eq!(spans[0].status, Status::error("ping error"));
        assert_eq!(spans[0].events.events.len(), 1);
    }

    #[rstest]
    #[case(None, Status::Ok, Status::Ok)]
    #[case(Some(Error::Skip), Status::error(Error::Skip.to_string()), Status::Ok)]
    #[case(Some(Error::from("error")), Status::error("error"), Status::error("error"))]
    fn error_classifiers(
        #[case] err: Option<Error>,
        #[case] plain: Status,
        #[case] ignore_skip: Status,
    ) {
        assert_eq!(span_status_from_error(err.as_ref()), plain);
        assert_eq!(span_status_from_error_ignore_skip(err.as_ref()), ignore_skip);
    }

    #[test]
    fn query_tracers() {
        let args = [NamedValue::positional(1, 42), NamedValue::named("name", 2, "foo")];

        assert!(trace_no_query(&Context::new(), "SELECT 1", &args).is_empty());
        assert_eq!(
            trace_query_without_args(&Context::new(), "SELECT 1", &args),
            vec![KeyValue::new("db.statement", "SELECT 1")]
        );
        assert_eq!(
            trace_query_with_args(&Context::new(), "SELECT 1", &args),
            vec![
                KeyValue::new("db.statement", "SELECT 1"),
                KeyValue::new("db.sql.args.1", 42_i64),
                KeyValue::new("db.sql.args.name", "foo"),
            ]
        );
    }

    #[test]
    fn default_span_name() {
        assert_eq!(format_span_name(&Context::new(), "begin_transaction"), "sql:begin_transaction");
    }
}
