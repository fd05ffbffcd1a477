//! Exec and query on a bare connection, preferring the connection's own
//! fast path and otherwise going through a prepared statement.
use opentelemetry::{otel_debug, Context};

use super::{named_values_to_values, Conn, ExecResult, NamedValue, Rows, Stmt};
use crate::{Error, Result};

/// Executes `query` on `conn`, falling back to prepare + exec when the
/// connection has no [`ExecerContext`](super::ExecerContext) fast path or
/// answers with [`Error::Skip`].
pub fn exec_with_fallback(
    conn: &dyn Conn,
    cx: &Context,
    query: &str,
    args: &[NamedValue],
) -> Result<Box<dyn ExecResult>> {
    if let Some(execer) = conn.as_execer_context() {
        match execer.exec_context(cx, query, args) {
            Err(Error::Skip) => {
                otel_debug!(name: "Fallback.ExecSkipped");
            }
            result => return result,
        }
    }

    let stmt = prepare(conn, cx, query)?;
    let result = match stmt.as_exec_context() {
        Some(execer) => execer.exec_context(cx, args),
        None => stmt.exec(&named_values_to_values(args)),
    };
    let closed = stmt.close();

    let result = result?;
    closed?;

    Ok(result)
}

/// Runs `query` on `conn`, falling back to prepare + query when the
/// connection has no [`QueryerContext`](super::QueryerContext) fast path or
/// answers with [`Error::Skip`].
///
/// On the fallback path the statement is closed once the rows are returned.
pub fn query_with_fallback(
    conn: &dyn Conn,
    cx: &Context,
    query: &str,
    args: &[NamedValue],
) -> Result<Box<dyn Rows>> {
    if let Some(queryer) = conn.as_queryer_context() {
        match queryer.query_context(cx, query, args) {
            Err(Error::Skip) => {
                otel_debug!(name: "Fallback.QuerySkipped");
            }
            result => return result,
        }
    }

    let stmt = prepare(conn, cx, query)?;
    let rows = match stmt.as_query_context() {
        Some(queryer) => queryer.query_context(cx, args),
        None => stmt.query(&named_values_to_values(args)),
    };
    let closed = stmt.close();

    let rows = rows?;
    closed?;

    Ok(rows)
}

fn prepare(conn: &dyn Conn, cx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
    match conn.as_prepare_context() {
        Some(preparer) => preparer.prepare_context(cx, query),
        None => conn.prepare(query),
    }
}
