//! Instrumentation of starting transactions.
use std::sync::Arc;

use opentelemetry::Context;

use crate::context::LabelsContextExt;
use crate::driver::{Conn, Tx, TxOptions};
use crate::middleware::Middleware;
use crate::recorder::MethodRecorder;
use crate::tracer::MethodTracer;
use crate::transaction::wrap_tx;
use crate::Result;

const METRIC_METHOD_BEGIN: &str = "begin";
const TRACE_METHOD_BEGIN: &str = "begin_transaction";

/// Shape of starting a transaction.
pub(crate) type BeginFn = Arc<dyn Fn(&Context, &TxOptions) -> Result<Box<dyn Tx>> + Send + Sync>;

/// Starts transactions on `conn`, with options when it supports them.
pub(crate) fn ensure_begin(conn: Arc<dyn Conn>) -> BeginFn {
    Arc::new(move |cx: &Context, opts: &TxOptions| match conn.as_begin_tx() {
        Some(begin) => begin.begin_tx(cx, opts),
        None => conn.begin(),
    })
}

fn begin_stats(recorder: MethodRecorder) -> Middleware<BeginFn> {
    Arc::new(move |next: BeginFn| -> BeginFn {
        let recorder = recorder.clone();
        Arc::new(move |cx: &Context, opts: &TxOptions| {
            let recording = recorder.record(cx, METRIC_METHOD_BEGIN, cx.metric_labels());
            let result = next(cx, opts);
            recording.end(result.as_ref().err());

            result
        })
    })
}

fn begin_trace(tracer: MethodTracer) -> Middleware<BeginFn> {
    Arc::new(move |next: BeginFn| -> BeginFn {
        let tracer = tracer.clone();
        Arc::new(move |cx: &Context, opts: &TxOptions| {
            let (cx, span) = tracer.trace(cx, TRACE_METHOD_BEGIN, cx.trace_labels());
            let result = next(&cx, opts);
            span.end(result.as_ref().err(), []);

            result
        })
    })
}

fn begin_wrap_tx(recorder: MethodRecorder, tracer: MethodTracer) -> Middleware<BeginFn> {
    Arc::new(move |next: BeginFn| -> BeginFn {
        let recorder = recorder.clone();
        let tracer = tracer.clone();
        Arc::new(move |cx: &Context, opts: &TxOptions| {
            let tx = next(cx, opts)?;
            let traced = tracer.should_trace(cx).should_trace.then_some(&tracer);

            Ok(wrap_tx(cx, tx, &recorder, traced))
        })
    })
}

pub(crate) fn begin_middlewares(
    recorder: &MethodRecorder,
    tracer: &MethodTracer,
) -> Vec<Middleware<BeginFn>> {
    vec![
        begin_stats(recorder.clone()),
        begin_trace(tracer.clone()),
        begin_wrap_tx(recorder.clone(), tracer.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use opentelemetry::trace::{SpanId, TraceContextExt, Tracer, TracerProvider};
    use opentelemetry::KeyValue;

    use super::*;
    use crate::capability::Capabilities;
    use crate::driver::IsolationLevel;
    use crate::middleware::chain;
    use crate::testing::{test_recorder, test_tracer, MockBackend};

    fn begin_fn(backend: &MockBackend) -> BeginFn {
        ensure_begin(Arc::new(backend.conn()))
    }

    #[test]
    fn prefers_begin_tx() {
        let backend = MockBackend::new(Capabilities::BEGIN_TX);
        let opts = TxOptions {
            isolation: IsolationLevel::Serializable,
            read_only: true,
        };

        begin_fn(&backend)(&Context::new(), &opts).unwrap();

        assert_eq!(backend.calls(), vec!["conn.begin_tx"]);
        assert_eq!(backend.last_tx_options(), Some(opts));
    }

    #[test]
    fn falls_back_to_begin() {
        let backend = MockBackend::new(Capabilities::empty());

        begin_fn(&backend)(&Context::new(), &TxOptions::default()).unwrap();

        assert_eq!(backend.calls(), vec!["conn.begin"]);
    }

    #[test]
    fn transaction_spans_share_root() {
        let (sink, recorder) = test_recorder();
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer).with_allow_root(true);
        let backend = MockBackend::new(Capabilities::BEGIN_TX);
        let begin = chain(&begin_middlewares(&recorder, &tracer), begin_fn(&backend));

        let tx = begin(&Context::new(), &TxOptions::default()).unwrap();
        tx.commit().unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "sql:begin_transaction");
        assert_eq!(spans[0].parent_span_id, SpanId::INVALID);
        assert_eq!(spans[1].name, "sql:commit");
        assert_eq!(spans[1].parent_span_id, spans[0].span_context.span_id());

        let operations: Vec<_> = sink
            .calls()
            .iter()
            .filter_map(|m| {
                m.attributes
                    .iter()
                    .find(|kv| kv.key.as_str() == "db.operation")
                    .map(|kv| kv.value.to_string())
            })
            .collect();
        assert_eq!(operations, vec!["begin", "commit"]);
    }

    #[test]
    fn transaction_not_traced_without_parent() {
        let (sink, recorder) = test_recorder();
        let (_provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let backend = MockBackend::new(Capabilities::empty());
        let begin = chain(&begin_middlewares(&recorder, &tracer), begin_fn(&backend));

        let tx = begin(&Context::new(), &TxOptions::default()).unwrap();
        tx.rollback().unwrap();

        assert!(exporter.get_finished_spans().unwrap().is_empty());
        assert_eq!(sink.calls().len(), 2);
    }

    #[test]
    fn begin_span_carries_trace_labels() {
        let (_sink, recorder) = test_recorder();
        let (provider, exporter, tracer) = test_tracer();
        let tracer = MethodTracer::new(tracer);
        let backend = MockBackend::new(Capabilities::empty());
        let begin = chain(&begin_middlewares(&recorder, &tracer), begin_fn(&backend));
        let cx = Context::new()
            .with_span(provider.tracer("test").start("parent"))
            .with_trace_labels([KeyValue::new("tenant", "acme")]);

        begin(&cx, &TxOptions::default()).unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(
            spans[0].attributes,
            vec![
                KeyValue::new("tenant", "acme"),
                KeyValue::new("db.operation", "begin_transaction"),
            ]
        );
    }
}
