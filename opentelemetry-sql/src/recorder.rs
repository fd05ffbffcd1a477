//! Latency and call count metrics of instrumented operations.
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{Context, KeyValue};

use crate::attribute::{self, DB_OPERATION, DB_SQL_ERROR};
use crate::context::CancellationContextExt;
use crate::Error;

/// Name of the latency histogram.
pub const DB_SQL_CLIENT_LATENCY: &str = "db.sql.client.latency";
/// Name of the call counter.
pub const DB_SQL_CLIENT_CALLS: &str = "db.sql.client.calls";

/// Destination of the measurements taken by a [`MethodRecorder`].
///
/// The default sink records into OpenTelemetry instruments, see
/// [`InstrumentSink`].
pub trait MetricsSink: Send + Sync + fmt::Debug {
    /// Records the latency of one call, in milliseconds.
    fn record_latency(&self, cx: &Context, millis: f64, attributes: &[KeyValue]);

    /// Counts calls.
    fn count_call(&self, cx: &Context, calls: u64, attributes: &[KeyValue]);
}

/// A [`MetricsSink`] backed by a latency histogram and a call counter.
#[derive(Clone, Debug)]
pub struct InstrumentSink {
    latency: Histogram<f64>,
    calls: Counter<u64>,
}

impl InstrumentSink {
    /// Creates the instruments with `meter`.
    pub fn new(meter: &Meter) -> Self {
        let latency = meter
            .f64_histogram(DB_SQL_CLIENT_LATENCY)
            .with_unit("ms")
            .with_description("The distribution of latencies of various calls in milliseconds")
            .build();
        let calls = meter
            .u64_counter(DB_SQL_CLIENT_CALLS)
            .with_unit("1")
            .with_description("The number of various calls of methods")
            .build();

        InstrumentSink { latency, calls }
    }
}

impl MetricsSink for InstrumentSink {
    fn record_latency(&self, cx: &Context, millis: f64, attributes: &[KeyValue]) {
        let _guard = cx.clone().attach();
        self.latency.record(millis, attributes);
    }

    fn count_call(&self, cx: &Context, calls: u64, attributes: &[KeyValue]) {
        let _guard = cx.clone().attach();
        self.calls.add(calls, attributes);
    }
}

/// Records metrics about operations.
#[derive(Clone, Debug)]
pub struct MethodRecorder {
    sink: Arc<dyn MetricsSink>,
    attributes: Arc<[KeyValue]>,
}

impl MethodRecorder {
    /// Creates a recorder adding `attributes` to every measurement.
    pub fn new(sink: Arc<dyn MetricsSink>, attributes: Vec<KeyValue>) -> Self {
        MethodRecorder {
            sink,
            attributes: attributes.into(),
        }
    }

    /// Starts recording one call of `method`.
    ///
    /// The measurement is taken when the returned [`Recording`] is ended.
    pub fn record(&self, cx: &Context, method: &'static str, labels: &[KeyValue]) -> Recording {
        let start = Instant::now();

        let mut attributes = Vec::with_capacity(self.attributes.len() + labels.len() + 3);
        attributes.extend_from_slice(&self.attributes);
        attributes.extend_from_slice(labels);
        attributes.push(KeyValue::new(DB_OPERATION, method));

        Recording {
            sink: Arc::clone(&self.sink),
            cx: cx.without_cancel(),
            start,
            attributes,
        }
    }
}

/// One call being recorded, see [`MethodRecorder::record`].
#[must_use = "the call is only recorded when the recording is ended"]
#[derive(Debug)]
pub struct Recording {
    sink: Arc<dyn MetricsSink>,
    cx: Context,
    start: Instant,
    attributes: Vec<KeyValue>,
}

impl Recording {
    /// Takes the measurements: one call and its latency, with the status of
    /// the call added to the attributes.
    pub fn end(mut self, err: Option<&Error>) {
        let elapsed = self.start.elapsed().as_nanos() as f64 / 1e6;

        match err {
            None => self.attributes.push(attribute::status_ok()),
            Some(err) => {
                self.attributes.push(attribute::status_error());
                self.attributes.push(KeyValue::new(DB_SQL_ERROR, err.to_string()));
            }
        }

        self.sink.count_call(&self.cx, 1, &self.attributes);
        self.sink.record_latency(&self.cx, elapsed, &self.attributes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Cancellation, LabelsContextExt};
    use crate::testing::InMemoryMetricsSink;

    #[test]
    fn records_success() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let recorder = MethodRecorder::new(sink.clone(), vec![KeyValue::new("db.instance", "test")]);

        recorder
            .record(&Context::new(), "ping", &[KeyValue::new("tenant", "acme")])
            .end(None);

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].value, 1);
        assert_eq!(
            calls[0].attributes,
            vec![
                KeyValue::new("db.instance", "test"),
                KeyValue::new("tenant", "acme"),
                KeyValue::new("db.operation", "ping"),
                KeyValue::new("db.sql.status", "OK"),
            ]
        );

        let latencies = sink.latencies();
        assert_eq!(latencies.len(), 1);
        assert!(latencies[0].value >= 0.0);
        assert_eq!(latencies[0].attributes, calls[0].attributes);
    }

    #[test]
    fn records_error() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let recorder = MethodRecorder::new(sink.clone(), Vec::new());

        recorder
            .record(&Context::new(), "exec", &[])
            .end(Some(&Error::from("exec error")));

        assert_eq!(
            sink.calls()[0].attributes,
            vec![
                KeyValue::new("db.operation", "exec"),
                KeyValue::new("db.sql.status", "ERROR"),
                KeyValue::new("db.sql.error", "exec error"),
            ]
        );
        assert_eq!(sink.latencies().len(), 1);
    }

    #[test]
    fn measurement_is_detached_from_cancellation() {
        let sink = Arc::new(InMemoryMetricsSink::default());
        let recorder = MethodRecorder::new(sink.clone(), Vec::new());
        let cancellation = Cancellation::new();
        let cx = Context::new()
            .with_cancellation(cancellation.clone())
            .with_metric_labels([KeyValue::new("tenant", "acme")]);

        let recording = recorder.record(&cx, "query", &[]);
        cancellation.cancel();
        recording.end(None);

        let calls = sink.calls();
        assert!(!calls[0].cx.is_cancelled());
        assert_eq!(calls[0].cx.metric_labels(), [KeyValue::new("tenant", "acme")]);
    }

    #[test]
    fn instrument_sink_with_noop_meter() {
        let meter = opentelemetry::global::meter("opentelemetry-sql-test");
        let recorder = MethodRecorder::new(Arc::new(InstrumentSink::new(&meter)), Vec::new());

        recorder.record(&Context::new(), "ping", &[]).end(None);
    }
}
