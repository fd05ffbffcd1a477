//! Facade over prepared statements.
use std::sync::Arc;

use opentelemetry::Context;

use crate::capability::Capabilities;
use crate::driver::{
    named_values_to_values, values_to_named_values, ColumnConverter, ExecResult, NamedValue,
    NamedValueChecker, Rows, Stmt, StmtExecContext, StmtQueryContext, Value,
};
use crate::exec::{skipped_exec, ExecFn};
use crate::middleware::{chain, Middleware};
use crate::query::{skipped_query, QueryFn};
use crate::{Error, Result};

/// Middlewares applied to every statement prepared on a connection.
#[derive(Clone, Default)]
pub(crate) struct StmtMiddlewares {
    pub(crate) exec: Arc<[Middleware<ExecFn>]>,
    pub(crate) query: Arc<[Middleware<QueryFn>]>,
}

/// Instrumented prepared statement.
///
/// Legacy calls without a context run under an empty [`Context`], so they
/// only get a span when the tracer allows root spans.
struct WrappedStmt {
    parent: Arc<dyn Stmt>,
    capabilities: Capabilities,
    query: Arc<str>,
    exec: ExecFn,
    exec_context: ExecFn,
    query_rows: QueryFn,
    query_context: QueryFn,
}

pub(crate) fn wrap_stmt(
    parent: Box<dyn Stmt>,
    query: &str,
    middlewares: &StmtMiddlewares,
) -> Box<dyn Stmt> {
    let parent: Arc<dyn Stmt> = Arc::from(parent);
    let capabilities = Capabilities::of_stmt(parent.as_ref());

    let exec: ExecFn = {
        let parent = Arc::clone(&parent);
        Arc::new(move |_cx: &Context, _query: &str, args: &[NamedValue]| {
            parent.exec(&named_values_to_values(args))
        })
    };
    let query_rows: QueryFn = {
        let parent = Arc::clone(&parent);
        Arc::new(move |_cx: &Context, _query: &str, args: &[NamedValue]| {
            parent.query(&named_values_to_values(args))
        })
    };

    let exec_context: ExecFn = if capabilities.contains(Capabilities::STMT_EXEC_CONTEXT) {
        let parent = Arc::clone(&parent);
        chain(
            &middlewares.exec,
            Arc::new(move |cx: &Context, _query: &str, args: &[NamedValue]| {
                match parent.as_exec_context() {
                    Some(stmt) => stmt.exec_context(cx, args),
                    None => Err(Error::Skip),
                }
            }),
        )
    } else {
        skipped_exec()
    };
    let query_context: QueryFn = if capabilities.contains(Capabilities::STMT_QUERY_CONTEXT) {
        let parent = Arc::clone(&parent);
        chain(
            &middlewares.query,
            Arc::new(move |cx: &Context, _query: &str, args: &[NamedValue]| {
                match parent.as_query_context() {
                    Some(stmt) => stmt.query_context(cx, args),
                    None => Err(Error::Skip),
                }
            }),
        )
    } else {
        skipped_query()
    };

    Box::new(WrappedStmt {
        capabilities,
        query: Arc::from(query),
        exec: chain(&middlewares.exec, exec),
        exec_context,
        query_rows: chain(&middlewares.query, query_rows),
        query_context,
        parent,
    })
}

impl Stmt for WrappedStmt {
    fn close(&self) -> Result<()> {
        self.parent.close()
    }

    fn num_input(&self) -> Option<usize> {
        self.parent.num_input()
    }

    fn exec(&self, args: &[Value]) -> Result<Box<dyn ExecResult>> {
        (self.exec)(&Context::new(), &self.query, &values_to_named_values(args))
    }

    fn query(&self, args: &[Value]) -> Result<Box<dyn Rows>> {
        (self.query_rows)(&Context::new(), &self.query, &values_to_named_values(args))
    }

    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        self.capabilities
            .contains(Capabilities::STMT_EXEC_CONTEXT)
            .then_some(self as &dyn StmtExecContext)
    }

    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        self.capabilities
            .contains(Capabilities::STMT_QUERY_CONTEXT)
            .then_some(self as &dyn StmtQueryContext)
    }

    fn as_column_converter(&self) -> Option<&dyn ColumnConverter> {
        self.capabilities
            .contains(Capabilities::COLUMN_CONVERTER)
            .then_some(self as &dyn ColumnConverter)
    }

    fn as_named_value_checker(&self) -> Option<&dyn NamedValueChecker> {
        self.capabilities
            .contains(Capabilities::NAMED_VALUE_CHECKER)
            .then_some(self as &dyn NamedValueChecker)
    }
}

impl StmtExecContext for WrappedStmt {
    fn exec_context(&self, cx: &Context, args: &[NamedValue]) -> Result<Box<dyn ExecResult>> {
        (self.exec_context)(cx, &self.query, args)
    }
}

impl StmtQueryContext for WrappedStmt {
    fn query_context(&self, cx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        (self.query_context)(cx, &self.query, args)
    }
}

impl ColumnConverter for WrappedStmt {
    fn convert_column(&self, index: usize, value: Value) -> Result<Value> {
        match self.parent.as_column_converter() {
            Some(stmt) => stmt.convert_column(index, value),
            None => Ok(value),
        }
    }
}

impl NamedValueChecker for WrappedStmt {
    fn check_named_value(&self, value: &mut NamedValue) -> Result<()> {
        match self.parent.as_named_value_checker() {
            Some(stmt) => stmt.check_named_value(value),
            None => Err(Error::Skip),
        }
    }
}
