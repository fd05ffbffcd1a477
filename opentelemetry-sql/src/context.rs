//! Values carried in the OpenTelemetry [`Context`] through instrumented
//! calls: per-call labels, the query text and a cancellation signal.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::baggage::{BaggageExt, KeyValueMetadata};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, KeyValue};

/// A cancellation signal shared between a caller and the backend.
///
/// Backends may check [`CancellationContextExt::is_cancelled`] to abort long
/// running work. The instrumentation never cancels anything itself.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Creates a signal that is not cancelled.
    pub fn new() -> Self {
        Cancellation::default()
    }

    /// Cancels the signal and every clone of it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether the signal has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Methods for attaching a [`Cancellation`] to a [`Context`].
pub trait CancellationContextExt {
    /// Returns a copy of the context carrying `cancellation`.
    fn with_cancellation(&self, cancellation: Cancellation) -> Self;

    /// Whether the context carries a cancelled signal.
    fn is_cancelled(&self) -> bool;

    /// Returns a copy of the context that is never cancelled.
    ///
    /// Everything else carried by the context is kept.
    fn without_cancel(&self) -> Self;
}

impl CancellationContextExt for Context {
    fn with_cancellation(&self, cancellation: Cancellation) -> Self {
        self.with_value(cancellation)
    }

    fn is_cancelled(&self) -> bool {
        self.get::<Cancellation>()
            .is_some_and(Cancellation::is_cancelled)
    }

    fn without_cancel(&self) -> Self {
        if self.get::<Cancellation>().is_none() {
            return self.clone();
        }

        self.with_value(Cancellation::new())
    }
}

#[derive(Clone, Debug, Default)]
struct MetricLabels(Arc<[KeyValue]>);

#[derive(Clone, Debug, Default)]
struct TraceLabels(Arc<[KeyValue]>);

fn append(
    existing: Option<&[KeyValue]>,
    labels: impl IntoIterator<Item = KeyValue>,
) -> Arc<[KeyValue]> {
    existing
        .unwrap_or_default()
        .iter()
        .cloned()
        .chain(labels)
        .collect()
}

/// Methods for attaching per-call labels to a [`Context`].
///
/// Metric labels are added to the attributes of every measurement taken
/// under the context, trace labels to every span started under it.
///
/// ```
/// use opentelemetry::{Context, KeyValue};
/// use opentelemetry_sql::LabelsContextExt;
///
/// let cx = Context::new().with_labels([KeyValue::new("tenant", "acme")]);
///
/// assert_eq!(cx.metric_labels(), [KeyValue::new("tenant", "acme")]);
/// assert_eq!(cx.trace_labels(), [KeyValue::new("tenant", "acme")]);
/// ```
pub trait LabelsContextExt {
    /// Returns a copy of the context with `labels` appended to its metric
    /// labels.
    fn with_metric_labels<I: IntoIterator<Item = KeyValue>>(&self, labels: I) -> Self;

    /// Returns a copy of the context with `labels` appended to its trace
    /// labels.
    fn with_trace_labels<I: IntoIterator<Item = KeyValue>>(&self, labels: I) -> Self;

    /// Returns a copy of the context with `labels` appended to both its metric
    /// and trace labels.
    fn with_labels<I: IntoIterator<Item = KeyValue>>(&self, labels: I) -> Self;

    /// Metric labels of the context.
    fn metric_labels(&self) -> &[KeyValue];

    /// Trace labels of the context.
    fn trace_labels(&self) -> &[KeyValue];
}

impl LabelsContextExt for Context {
    fn with_metric_labels<I: IntoIterator<Item = KeyValue>>(&self, labels: I) -> Self {
        let existing = self.get::<MetricLabels>().map(|l| &*l.0);
        self.with_value(MetricLabels(append(existing, labels)))
    }

    fn with_trace_labels<I: IntoIterator<Item = KeyValue>>(&self, labels: I) -> Self {
        let existing = self.get::<TraceLabels>().map(|l| &*l.0);
        self.with_value(TraceLabels(append(existing, labels)))
    }

    fn with_labels<I: IntoIterator<Item = KeyValue>>(&self, labels: I) -> Self {
        let labels: Vec<KeyValue> = labels.into_iter().collect();
        self.with_metric_labels(labels.clone())
            .with_trace_labels(labels)
    }

    fn metric_labels(&self) -> &[KeyValue] {
        self.get::<MetricLabels>()
            .map(|l| &*l.0)
            .unwrap_or_default()
    }

    fn trace_labels(&self) -> &[KeyValue] {
        self.get::<TraceLabels>()
            .map(|l| &*l.0)
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
struct QueryText(Arc<str>);

/// Methods for attaching the query text to a [`Context`].
///
/// Instrumented exec and query calls set the query before their span is
/// started, so a custom span name formatter can read it.
pub trait QueryContextExt {
    /// Returns a copy of the context carrying `query`.
    fn with_query(&self, query: &str) -> Self;

    /// The query carried by the context, if any.
    fn query(&self) -> Option<&str>;
}

impl QueryContextExt for Context {
    fn with_query(&self, query: &str) -> Self {
        self.with_value(QueryText(Arc::from(query)))
    }

    fn query(&self) -> Option<&str> {
        self.get::<QueryText>().map(|q| &*q.0)
    }
}

/// Builds a fresh context holding only the span context and baggage of `cx`.
///
/// Used for work that happens after the call that produced it has returned,
/// such as committing a transaction or reading an exec result.
pub(crate) fn span_context_only(cx: &Context) -> Context {
    let span_context = cx.span().span_context().clone();
    let baggage = cx
        .baggage()
        .iter()
        .map(|(k, (v, m))| KeyValueMetadata::new(k.clone(), v.clone(), m.clone()));
    let root = Context::new().with_baggage(baggage);

    if span_context.is_valid() {
        root.with_remote_span_context(span_context)
    } else {
        root
    }
}
