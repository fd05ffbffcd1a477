//! Tracing of row cursors.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::{Context, KeyValue};

use crate::attribute::{
    key_value_duration, DB_SQL_ROWS_NEXT_LATENCY_AVG, DB_SQL_ROWS_NEXT_SUCCESS_COUNT,
};
use crate::capability::Capabilities;
use crate::context::span_context_only;
use crate::driver::{
    Rows, RowsColumnTypeDatabaseTypeName, RowsColumnTypeLength, RowsColumnTypeNullable,
    RowsColumnTypePrecisionScale, RowsColumnTypeScanType, RowsNextResultSet, Value, ValueKind,
};
use crate::tracer::MethodTracer;
use crate::Result;

const TRACE_METHOD_ROWS_NEXT: &str = "rows_next";
const TRACE_METHOD_ROWS_CLOSE: &str = "rows_close";

/// Shape of fetching the next row.
pub(crate) type RowsNextFn = Arc<dyn Fn(&mut [Value]) -> Result<bool> + Send + Sync>;
/// Shape of closing rows.
pub(crate) type RowsCloseFn = Arc<dyn Fn() -> Result<()> + Send + Sync>;

#[derive(Debug, Default)]
struct NextStats {
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl NextStats {
    fn add(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of successful calls and their average latency.
    fn snapshot(&self) -> (i64, Option<Duration>) {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return (0, None);
        }

        let total = self.total_nanos.load(Ordering::Relaxed);
        (
            i64::try_from(count).unwrap_or(i64::MAX),
            Some(Duration::from_nanos(total / count)),
        )
    }
}

fn rows_next_count(stats: Arc<NextStats>, next: RowsNextFn) -> RowsNextFn {
    Arc::new(move |dest: &mut [Value]| {
        let start = Instant::now();
        let result = next(dest);
        if matches!(result, Ok(true)) {
            stats.add(start.elapsed());
        }

        result
    })
}

fn rows_next_trace(cx: Context, tracer: MethodTracer, next: RowsNextFn) -> RowsNextFn {
    Arc::new(move |dest: &mut [Value]| {
        let (_cx, span) = tracer.must_trace(&cx, TRACE_METHOD_ROWS_NEXT, &[]);
        let result = next(dest);
        span.end(result.as_ref().err(), []);

        result
    })
}

fn rows_close_trace(
    cx: Context,
    tracer: MethodTracer,
    stats: Arc<NextStats>,
    close: RowsCloseFn,
) -> RowsCloseFn {
    Arc::new(move || {
        let (_cx, span) = tracer.must_trace(&cx, TRACE_METHOD_ROWS_CLOSE, &[]);
        let result = close();

        let (count, average) = stats.snapshot();
        let mut attributes = vec![KeyValue::new(DB_SQL_ROWS_NEXT_SUCCESS_COUNT, count)];
        if let Some(average) = average {
            attributes.push(key_value_duration(DB_SQL_ROWS_NEXT_LATENCY_AVG, average));
        }
        span.end(result.as_ref().err(), attributes);

        result
    })
}

/// Rows facade: `next` and `close` go through the traced closures, every
/// optional capability of the parent is forwarded.
struct WrappedRows {
    parent: Arc<dyn Rows>,
    capabilities: Capabilities,
    next: RowsNextFn,
    close: RowsCloseFn,
}

/// Wraps `parent` so that the enabled operations get their own span,
/// parented by the span of `cx`. Returns `parent` itself when nothing is
/// traced.
pub(crate) fn wrap_rows(
    cx: &Context,
    parent: Box<dyn Rows>,
    tracer: &MethodTracer,
    trace_rows_next: bool,
    trace_rows_close: bool,
) -> Box<dyn Rows> {
    if !trace_rows_next && !trace_rows_close {
        return parent;
    }

    let cx = span_context_only(cx);
    let parent: Arc<dyn Rows> = Arc::from(parent);
    let capabilities = Capabilities::of_rows(parent.as_ref());

    let mut next: RowsNextFn = {
        let parent = Arc::clone(&parent);
        Arc::new(move |dest: &mut [Value]| parent.next(dest))
    };
    let mut close: RowsCloseFn = {
        let parent = Arc::clone(&parent);
        Arc::new(move || parent.close())
    };

    if trace_rows_close {
        let stats = Arc::new(NextStats::default());
        next = rows_next_count(Arc::clone(&stats), next);
        close = rows_close_trace(cx.clone(), tracer.clone(), stats, close);
    }

    if trace_rows_next {
        next = rows_next_trace(cx, tracer.clone(), next);
    }

    Box::new(WrappedRows {
        parent,
        capabilities,
        next,
        close,
    })
}

impl Rows for WrappedRows {
    fn columns(&self) -> Vec<String> {
        self.parent.columns()
    }

    fn close(&self) -> Result<()> {
        (self.close)()
    }

    fn next(&self, dest: &mut [Value]) -> Result<bool> {
        (self.next)(dest)
    }

    fn as_next_result_set(&self) -> Option<&dyn RowsNextResultSet> {
        self.capabilities
            .contains(Capabilities::NEXT_RESULT_SET)
            .then_some(self as &dyn RowsNextResultSet)
    }

    fn as_column_type_database_type_name(&self) -> Option<&dyn RowsColumnTypeDatabaseTypeName> {
        self.capabilities
            .contains(Capabilities::COLUMN_TYPE_DATABASE_TYPE_NAME)
            .then_some(self as &dyn RowsColumnTypeDatabaseTypeName)
    }

    fn as_column_type_length(&self) -> Option<&dyn RowsColumnTypeLength> {
        self.capabilities
            .contains(Capabilities::COLUMN_TYPE_LENGTH)
            .then_some(self as &dyn RowsColumnTypeLength)
    }

    fn as_column_type_nullable(&self) -> Option<&dyn RowsColumnTypeNullable> {
        self.capabilities
            .contains(Capabilities::COLUMN_TYPE_NULLABLE)
            .then_some(self as &dyn RowsColumnTypeNullable)
    }

    fn as_column_type_precision_scale(&self) -> Option<&dyn RowsColumnTypePrecisionScale> {
        self.capabilities
            .contains(Capabilities::COLUMN_TYPE_PRECISION_SCALE)
            .then_some(self as &dyn RowsColumnTypePrecisionScale)
    }

    fn as_column_type_scan_type(&self) -> Option<&dyn RowsColumnTypeScanType> {
        self.capabilities
            .contains(Capabilities::COLUMN_TYPE_SCAN_TYPE)
            .then_some(self as &dyn RowsColumnTypeScanType)
    }
}

impl RowsNextResultSet for WrappedRows {
    fn has_next_result_set(&self) -> bool {
        self.parent
            .as_next_result_set()
            .is_some_and(|rows| rows.has_next_result_set())
    }

    fn next_result_set(&self) -> Result<bool> {
        match self.parent.as_next_result_set() {
            Some(rows) => rows.next_result_set(),
            None => Ok(false),
        }
    }
}

impl RowsColumnTypeDatabaseTypeName for WrappedRows {
    fn column_type_database_type_name(&self, index: usize) -> String {
        self.parent
            .as_column_type_database_type_name()
            .map(|rows| rows.column_type_database_type_name(index))
            .unwrap_or_default()
    }
}

impl RowsColumnTypeLength for WrappedRows {
    fn column_type_length(&self, index: usize) -> Option<u64> {
        self.parent
            .as_column_type_length()
            .and_then(|rows| rows.column_type_length(index))
    }
}

impl RowsColumnTypeNullable for WrappedRows {
    fn column_type_nullable(&self, index: usize) -> Option<bool> {
        self.parent
            .as_column_type_nullable()
            .and_then(|rows| rows.column_type_nullable(index))
    }
}

impl RowsColumnTypePrecisionScale for WrappedRows {
    fn column_type_precision_scale(&self, index: usize) -> Option<(i64, i64)> {
        self.parent
            .as_column_type_precision_scale()
            .and_then(|rows| rows.column_type_precision_scale(index))
    }
}

impl RowsColumnTypeScanType for WrappedRows {
    fn column_type_scan_type(&self, index: usize) -> ValueKind {
        self.parent
            .as_column_type_scan_type()
            .map_or(ValueKind::Null, |rows| rows.column_type_scan_type(index))
    }
}
