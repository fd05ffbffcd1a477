//! Instrumentation of commit and rollback.
use std::sync::Arc;

use opentelemetry::{Context, KeyValue};

use crate::context::{span_context_only, LabelsContextExt};
use crate::driver::Tx;
use crate::middleware::{chain, Middleware};
use crate::recorder::MethodRecorder;
use crate::tracer::MethodTracer;
use crate::Result;

const METRIC_METHOD_COMMIT: &str = "commit";
const TRACE_METHOD_COMMIT: &str = "commit";
const METRIC_METHOD_ROLLBACK: &str = "rollback";
const TRACE_METHOD_ROLLBACK: &str = "rollback";

/// Shape of ending a transaction.
pub(crate) type TxFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

fn tx_stats(
    cx: Context,
    recorder: MethodRecorder,
    labels: Arc<[KeyValue]>,
    method: &'static str,
) -> Middleware<TxFn> {
    Arc::new(move |next: TxFn| -> TxFn {
        let cx = cx.clone();
        let recorder = recorder.clone();
        let labels = Arc::clone(&labels);
        Arc::new(move || {
            let recording = recorder.record(&cx, method, &labels);
            let result = next();
            recording.end(result.as_ref().err());

            result
        })
    })
}

fn tx_trace(cx: Context, tracer: MethodTracer, method: &'static str) -> Middleware<TxFn> {
    Arc::new(move |next: TxFn| -> TxFn {
        let cx = cx.clone();
        let tracer = tracer.clone();
        Arc::new(move || {
            let (_cx, span) = tracer.must_trace(&cx, method, &[]);
            let result = next();
            span.end(result.as_ref().err(), []);

            result
        })
    })
}

struct WrappedTx {
    commit: TxFn,
    rollback: TxFn,
}

impl Tx for WrappedTx {
    fn commit(&self) -> Result<()> {
        (self.commit)()
    }

    fn rollback(&self) -> Result<()> {
        (self.rollback)()
    }
}

/// Wraps a transaction started under `cx`.
///
/// Commit and rollback run after the call that started the transaction has
/// returned, so they only keep the span context of `cx` and its metric
/// labels. They are traced when `tracer` is given.
pub(crate) fn wrap_tx(
    cx: &Context,
    parent: Box<dyn Tx>,
    recorder: &MethodRecorder,
    tracer: Option<&MethodTracer>,
) -> Box<dyn Tx> {
    let labels: Arc<[KeyValue]> = cx.metric_labels().into();
    let cx = span_context_only(cx);
    let parent: Arc<dyn Tx> = Arc::from(parent);

    let end = |metric_method: &'static str, trace_method: &'static str, terminal: TxFn| {
        let mut middlewares = vec![tx_stats(
            cx.clone(),
            recorder.clone(),
            Arc::clone(&labels),
            metric_method,
        )];
        if let Some(tracer) = tracer {
            middlewares.push(tx_trace(cx.clone(), tracer.clone(), trace_method));
        }

        chain(&middlewares, terminal)
    };

    let commit: TxFn = {
        let parent = Arc::clone(&parent);
        Arc::new(move || parent.commit())
    };
    let rollback: TxFn = Arc::new(move || parent.rollback());

    Box::new(WrappedTx {
        commit: end(METRIC_METHOD_COMMIT, TRACE_METHOD_COMMIT, commit),
        rollback: end(METRIC_METHOD_ROLLBACK, TRACE_METHOD_ROLLBACK, rollback),
    })
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{Status, TraceContextExt, Tracer, TracerProvider};

    use super::*;
    use crate::capability::Capabilities;
    use crate::testing::{test_recorder, test_tracer, MockBackend, Operation};
    use crate::Error;

    #[test]
    fn commit_is_measured_and_traced() {
        let (sink, recorder) = test_recorder();
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let cx = Context::new()
            .with_span(provider.tracer("test").start("parent"))
            .with_labels([KeyValue::new("tenant", "acme")]);
        let backend = MockBackend::new(Capabilities::empty());

        let tx = wrap_tx(&cx, backend.tx(), &recorder, Some(&tracer));
        tx.commit().unwrap();

        assert_eq!(backend.calls(), vec!["tx.commit"]);
        assert_eq!(
            sink.calls()[0].attributes,
            vec![
                KeyValue::new("tenant", "acme"),
                KeyValue::new("db.operation", "commit"),
                KeyValue::new("db.sql.status", "OK"),
            ]
        );

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "sql:commit");
        assert_eq!(spans[0].parent_span_id, cx.span().span_context().span_id());
        assert_eq!(spans[0].attributes, vec![KeyValue::new("db.operation", "commit")]);
    }

    #[test]
    fn rollback_error_without_tracer() {
        let (sink, recorder) = test_recorder();
        let (_provider, exporter, _tracer) = test_tracer();
        let backend = MockBackend::new(Capabilities::empty())
            .with_error(Operation::Rollback, "rollback error");

        let tx = wrap_tx(&Context::new(), backend.tx(), &recorder, None);
        let err = tx.rollback().unwrap_err();

        assert_eq!(err.to_string(), "rollback error");
        assert_eq!(
            sink.calls()[0].attributes,
            vec![
                KeyValue::new("db.operation", "rollback"),
                KeyValue::new("db.sql.status", "ERROR"),
                KeyValue::new("db.sql.error", "rollback error"),
            ]
        );
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn traced_commit_error_sets_status() {
        let (_sink, recorder) = test_recorder();
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let cx = Context::new().with_span(provider.tracer("test").start("parent"));
        let backend = MockBackend::new(Capabilities::empty())
            .with_error(Operation::Commit, Error::BadConnection);

        let tx = wrap_tx(&cx, backend.tx(), &recorder, Some(&tracer));
        assert!(tx.commit().is_err());

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].status, Status::error(Error::BadConnection.to_string()));
    }
}
