//! Configuration of a wrapped driver.
use std::fmt;
use std::sync::Arc;

use opentelemetry::global::BoxedTracer;
use opentelemetry::metrics::MeterProvider;
use opentelemetry::trace::{Span, Status, Tracer, TracerProvider};
use opentelemetry::{Context, InstrumentationScope, KeyValue, StringValue, Value};

use crate::attribute::{DB_INSTANCE, DB_NAME, DB_STATEMENT, DB_SYSTEM};
use crate::driver::NamedValue;
use crate::recorder::{InstrumentSink, MetricsSink};
use crate::tracer::{self, ErrorToStatus, QueryTracer, SpanNameFormatter};
use crate::Error;

/// Which optional spans are created.
///
/// Everything is disabled by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraceOptions {
    /// Start root spans for operations called without a parent span.
    pub allow_root: bool,
    /// Trace `ping`.
    pub ping: bool,
    /// Trace every `next` call of returned rows.
    pub rows_next: bool,
    /// Trace closing returned rows.
    pub rows_close: bool,
    /// Trace reading the number of affected rows of an exec result.
    pub rows_affected: bool,
    /// Trace reading the last insert id of an exec result.
    pub last_insert_id: bool,
}

impl TraceOptions {
    /// Every optional span enabled.
    pub fn all() -> Self {
        TraceOptions {
            allow_root: true,
            ping: true,
            rows_next: true,
            rows_close: true,
            rows_affected: true,
            last_insert_id: true,
        }
    }
}

/// Configuration of a wrapped driver, see [`Options::builder`].
#[derive(Clone)]
pub struct Options {
    pub(crate) tracer: Option<Arc<BoxedTracer>>,
    pub(crate) metrics_sink: Option<Arc<dyn MetricsSink>>,
    pub(crate) default_attributes: Vec<KeyValue>,
    pub(crate) span_name_formatter: SpanNameFormatter,
    pub(crate) error_to_status: ErrorToStatus,
    pub(crate) query_tracer: QueryTracer,
    pub(crate) trace: TraceOptions,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("has_tracer", &self.tracer.is_some())
            .field("metrics_sink", &self.metrics_sink)
            .field("default_attributes", &self.default_attributes)
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            tracer: None,
            metrics_sink: None,
            default_attributes: Vec::new(),
            span_name_formatter: Arc::new(tracer::format_span_name),
            error_to_status: Arc::new(tracer::span_status_from_error),
            query_tracer: Arc::new(tracer::trace_no_query),
            trace: TraceOptions::default(),
        }
    }
}

impl Options {
    /// Starts building options from the defaults: global tracer and meter
    /// providers, no optional spans, no query attributes.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Trace flags of these options.
    pub fn trace_options(&self) -> TraceOptions {
        self.trace
    }

    /// Default attributes added to every span and measurement.
    pub fn default_attributes(&self) -> &[KeyValue] {
        &self.default_attributes
    }
}

pub(crate) fn instrumentation_scope() -> InstrumentationScope {
    InstrumentationScope::builder("opentelemetry-sql")
        .with_version(env!("CARGO_PKG_VERSION"))
        .build()
}

/// Builder for [`Options`].
#[derive(Debug, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Starts spans with a tracer from `provider` instead of the global one.
    pub fn with_tracer_provider<P, T, S>(mut self, provider: &P) -> Self
    where
        P: TracerProvider<Tracer = T>,
        T: Tracer<Span = S> + Send + Sync + 'static,
        S: Span + Send + Sync + 'static,
    {
        let tracer = provider.tracer_with_scope(instrumentation_scope());
        self.options.tracer = Some(Arc::new(BoxedTracer::new(Box::new(tracer))));
        self
    }

    /// Records metrics with a meter from `provider` instead of the global
    /// one.
    pub fn with_meter_provider<P: MeterProvider>(mut self, provider: &P) -> Self {
        let meter = provider.meter_with_scope(instrumentation_scope());
        self.options.metrics_sink = Some(Arc::new(InstrumentSink::new(&meter)));
        self
    }

    /// Sends measurements to `sink` instead of OpenTelemetry instruments.
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.options.metrics_sink = Some(sink);
        self
    }

    /// Adds attributes to every span and measurement.
    pub fn with_default_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.options.default_attributes.extend(attributes);
        self
    }

    /// Sets the `db.instance` attribute.
    pub fn with_instance_name(self, instance_name: impl Into<StringValue>) -> Self {
        self.with_default_attributes([KeyValue::new(
            DB_INSTANCE,
            Value::String(instance_name.into()),
        )])
    }

    /// Sets the `db.system` attribute, e.g. `postgresql`.
    pub fn with_system(self, system: impl Into<StringValue>) -> Self {
        self.with_default_attributes([KeyValue::new(DB_SYSTEM, Value::String(system.into()))])
    }

    /// Sets the `db.name` attribute.
    pub fn with_database_name(self, database_name: impl Into<StringValue>) -> Self {
        self.with_default_attributes([KeyValue::new(
            DB_NAME,
            Value::String(database_name.into()),
        )])
    }

    /// Replaces the span name formatter.
    pub fn with_span_name_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Context, &str) -> String + Send + Sync + 'static,
    {
        self.options.span_name_formatter = Arc::new(formatter);
        self
    }

    /// Replaces the mapping of operation outcomes to span statuses.
    pub fn with_error_to_status<F>(mut self, error_to_status: F) -> Self
    where
        F: Fn(Option<&Error>) -> Status + Send + Sync + 'static,
    {
        self.options.error_to_status = Arc::new(error_to_status);
        self
    }

    /// Does not mark spans as failed when the backend answers
    /// [`Error::Skip`].
    pub fn disable_err_skip(mut self) -> Self {
        self.options.error_to_status = Arc::new(tracer::span_status_from_error_ignore_skip);
        self
    }

    /// Replaces the query tracer.
    pub fn with_query_tracer<F>(mut self, query_tracer: F) -> Self
    where
        F: Fn(&Context, &str, &[NamedValue]) -> Vec<KeyValue> + Send + Sync + 'static,
    {
        self.options.query_tracer = Arc::new(query_tracer);
        self
    }

    /// Adds the query text and its arguments to spans.
    pub fn trace_query_with_args(mut self) -> Self {
        self.options.query_tracer = Arc::new(tracer::trace_query_with_args);
        self
    }

    /// Adds the query text to spans.
    pub fn trace_query_without_args(mut self) -> Self {
        self.options.query_tracer = Arc::new(tracer::trace_query_without_args);
        self
    }

    /// Adds the query text, passed through `transform`, to spans.
    ///
    /// Typically used to strip literals from queries.
    pub fn trace_query_transformed<F>(self, transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.with_query_tracer(move |_cx: &Context, query: &str, _args: &[NamedValue]| {
            vec![KeyValue::new(DB_STATEMENT, transform(query))]
        })
    }

    /// Replaces every trace flag.
    pub fn with_trace_options(mut self, trace: TraceOptions) -> Self {
        self.options.trace = trace;
        self
    }

    /// Starts root spans for operations called without a parent span.
    pub fn allow_root(mut self) -> Self {
        self.options.trace.allow_root = true;
        self
    }

    /// Traces `ping`.
    pub fn trace_ping(mut self) -> Self {
        self.options.trace.ping = true;
        self
    }

    /// Traces every `next` call of returned rows.
    pub fn trace_rows_next(mut self) -> Self {
        self.options.trace.rows_next = true;
        self
    }

    /// Traces closing returned rows.
    pub fn trace_rows_close(mut self) -> Self {
        self.options.trace.rows_close = true;
        self
    }

    /// Traces reading the number of affected rows of exec results.
    pub fn trace_rows_affected(mut self) -> Self {
        self.options.trace.rows_affected = true;
        self
    }

    /// Traces reading the last insert id of exec results.
    pub fn trace_last_insert_id(mut self) -> Self {
        self.options.trace.last_insert_id = true;
        self
    }

    /// Enables every optional span and adds queries with their arguments to
    /// spans.
    pub fn trace_all(self) -> Self {
        self.with_trace_options(TraceOptions::all())
            .trace_query_with_args()
    }

    /// Builds the options.
    pub fn build(self) -> Options {
        self.options
    }
}
