//! The backend driver interface.
//!
//! A backend implements a small mandatory surface per object ([`Driver`],
//! [`Conn`], [`Stmt`], [`Rows`], [`Tx`], [`ExecResult`]) plus any number of
//! optional capabilities. Optional capabilities are discovered through the
//! `as_*` accessors, which return `None` unless the backend overrides them:
//!
//! ```
//! use opentelemetry::Context;
//! use opentelemetry_sql::driver::{Conn, Pinger, Stmt, Tx};
//! use opentelemetry_sql::Result;
//!
//! struct MyConn;
//!
//! impl Conn for MyConn {
//!     fn prepare(&self, _query: &str) -> Result<Box<dyn Stmt>> {
//!         unimplemented!()
//!     }
//!
//!     fn begin(&self) -> Result<Box<dyn Tx>> {
//!         unimplemented!()
//!     }
//!
//!     fn close(&self) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn as_pinger(&self) -> Option<&dyn Pinger> {
//!         Some(self)
//!     }
//! }
//!
//! impl Pinger for MyConn {
//!     fn ping(&self, _cx: &Context) -> Result<()> {
//!         Ok(())
//!     }
//! }
//! ```
//!
//! Every method takes `&self`: implementations that need mutable state keep
//! it behind their own synchronization, the instrumentation adds none.
use opentelemetry::Context;

use crate::Result;

mod fallback;
mod value;

pub use fallback::{exec_with_fallback, query_with_fallback};
pub use value::{
    named_values_to_values, values_to_named_values, IsolationLevel, NamedValue, TxOptions, Value,
    ValueKind,
};

/// Entry point of a backend: opens connections by data source name.
pub trait Driver: Send + Sync {
    /// Opens a new connection.
    fn open(&self, name: &str) -> Result<Box<dyn Conn>>;

    /// Returns the [`DriverContext`] capability, if implemented.
    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        None
    }
}

/// Drivers able to parse the data source name once and hand out a
/// [`Connector`].
pub trait DriverContext: Send + Sync {
    /// Parses `name` and returns a connector for it.
    fn open_connector(&self, name: &str) -> Result<Box<dyn Connector>>;
}

/// Opens connections for a fixed data source.
pub trait Connector: Send + Sync {
    /// Opens a new connection.
    fn connect(&self, cx: &Context) -> Result<Box<dyn Conn>>;

    /// Releases resources held by the connector.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A connection to the database.
pub trait Conn: Send + Sync {
    /// Prepares a statement.
    fn prepare(&self, query: &str) -> Result<Box<dyn Stmt>>;

    /// Starts a transaction with default options.
    fn begin(&self) -> Result<Box<dyn Tx>>;

    /// Closes the connection.
    fn close(&self) -> Result<()>;

    /// Returns the [`Pinger`] capability, if implemented.
    fn as_pinger(&self) -> Option<&dyn Pinger> {
        None
    }

    /// Returns the [`ExecerContext`] capability, if implemented.
    fn as_execer_context(&self) -> Option<&dyn ExecerContext> {
        None
    }

    /// Returns the [`QueryerContext`] capability, if implemented.
    fn as_queryer_context(&self) -> Option<&dyn QueryerContext> {
        None
    }

    /// Returns the [`ConnPrepareContext`] capability, if implemented.
    fn as_prepare_context(&self) -> Option<&dyn ConnPrepareContext> {
        None
    }

    /// Returns the [`ConnBeginTx`] capability, if implemented.
    fn as_begin_tx(&self) -> Option<&dyn ConnBeginTx> {
        None
    }

    /// Returns the [`NamedValueChecker`] capability, if implemented.
    fn as_named_value_checker(&self) -> Option<&dyn NamedValueChecker> {
        None
    }

    /// Returns the [`SessionResetter`] capability, if implemented.
    fn as_session_resetter(&self) -> Option<&dyn SessionResetter> {
        None
    }
}

/// Connections that can verify they are still alive.
pub trait Pinger {
    /// Checks the connection.
    fn ping(&self, cx: &Context) -> Result<()>;
}

/// Connections that execute queries without preparing them first.
///
/// Returning [`Error::Skip`](crate::Error::Skip) asks the caller to fall back
/// to prepare + exec.
pub trait ExecerContext {
    /// Executes a query that returns no rows.
    fn exec_context(
        &self,
        cx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn ExecResult>>;
}

/// Connections that run queries without preparing them first.
///
/// Returning [`Error::Skip`](crate::Error::Skip) asks the caller to fall back
/// to prepare + query.
pub trait QueryerContext {
    /// Runs a query that returns rows.
    fn query_context(&self, cx: &Context, query: &str, args: &[NamedValue])
        -> Result<Box<dyn Rows>>;
}

/// Connections that prepare statements with a context.
pub trait ConnPrepareContext {
    /// Prepares a statement.
    fn prepare_context(&self, cx: &Context, query: &str) -> Result<Box<dyn Stmt>>;
}

/// Connections that start transactions with options and a context.
pub trait ConnBeginTx {
    /// Starts a transaction.
    fn begin_tx(&self, cx: &Context, opts: &TxOptions) -> Result<Box<dyn Tx>>;
}

/// Connections or statements that validate and convert bound arguments.
pub trait NamedValueChecker {
    /// Checks, and possibly converts, an argument in place.
    ///
    /// Returning [`Error::Skip`](crate::Error::Skip) selects the default
    /// conversion.
    fn check_named_value(&self, value: &mut NamedValue) -> Result<()>;
}

/// Connections that can be reset before reuse.
pub trait SessionResetter {
    /// Resets the session state.
    fn reset_session(&self, cx: &Context) -> Result<()>;
}

/// A prepared statement.
pub trait Stmt: Send + Sync {
    /// Closes the statement.
    fn close(&self) -> Result<()>;

    /// Number of placeholders, `None` when the backend does not know.
    fn num_input(&self) -> Option<usize>;

    /// Executes the statement with positional values.
    fn exec(&self, args: &[Value]) -> Result<Box<dyn ExecResult>>;

    /// Runs the statement with positional values.
    fn query(&self, args: &[Value]) -> Result<Box<dyn Rows>>;

    /// Returns the [`StmtExecContext`] capability, if implemented.
    fn as_exec_context(&self) -> Option<&dyn StmtExecContext> {
        None
    }

    /// Returns the [`StmtQueryContext`] capability, if implemented.
    fn as_query_context(&self) -> Option<&dyn StmtQueryContext> {
        None
    }

    /// Returns the [`ColumnConverter`] capability, if implemented.
    fn as_column_converter(&self) -> Option<&dyn ColumnConverter> {
        None
    }

    /// Returns the [`NamedValueChecker`] capability, if implemented.
    fn as_named_value_checker(&self) -> Option<&dyn NamedValueChecker> {
        None
    }
}

/// Statements that execute with a context and named arguments.
pub trait StmtExecContext {
    /// Executes the statement.
    fn exec_context(&self, cx: &Context, args: &[NamedValue]) -> Result<Box<dyn ExecResult>>;
}

/// Statements that run with a context and named arguments.
pub trait StmtQueryContext {
    /// Runs the statement.
    fn query_context(&self, cx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>>;
}

/// Legacy per-column argument conversion.
pub trait ColumnConverter {
    /// Converts the argument bound to the column at `index`.
    fn convert_column(&self, index: usize, value: Value) -> Result<Value>;
}

/// Outcome of an exec.
pub trait ExecResult: Send + Sync {
    /// The id generated by the database for the inserted row.
    fn last_insert_id(&self) -> Result<i64>;

    /// Number of rows changed by the exec.
    fn rows_affected(&self) -> Result<i64>;
}

/// A cursor over the rows returned by a query.
pub trait Rows: Send + Sync {
    /// Column names.
    fn columns(&self) -> Vec<String>;

    /// Closes the cursor.
    fn close(&self) -> Result<()>;

    /// Fills `dest` with the next row. Returns `Ok(false)` once the rows are
    /// exhausted.
    fn next(&self, dest: &mut [Value]) -> Result<bool>;

    /// Returns the [`RowsNextResultSet`] capability, if implemented.
    fn as_next_result_set(&self) -> Option<&dyn RowsNextResultSet> {
        None
    }

    /// Returns the [`RowsColumnTypeDatabaseTypeName`] capability, if implemented.
    fn as_column_type_database_type_name(&self) -> Option<&dyn RowsColumnTypeDatabaseTypeName> {
        None
    }

    /// Returns the [`RowsColumnTypeLength`] capability, if implemented.
    fn as_column_type_length(&self) -> Option<&dyn RowsColumnTypeLength> {
        None
    }

    /// Returns the [`RowsColumnTypeNullable`] capability, if implemented.
    fn as_column_type_nullable(&self) -> Option<&dyn RowsColumnTypeNullable> {
        None
    }

    /// Returns the [`RowsColumnTypePrecisionScale`] capability, if implemented.
    fn as_column_type_precision_scale(&self) -> Option<&dyn RowsColumnTypePrecisionScale> {
        None
    }

    /// Returns the [`RowsColumnTypeScanType`] capability, if implemented.
    fn as_column_type_scan_type(&self) -> Option<&dyn RowsColumnTypeScanType> {
        None
    }
}

/// Rows spanning several result sets.
pub trait RowsNextResultSet {
    /// Whether another result set follows the current one.
    fn has_next_result_set(&self) -> bool;

    /// Advances to the next result set. Returns `Ok(false)` when there is none.
    fn next_result_set(&self) -> Result<bool>;
}

/// Rows reporting the database type name of each column.
pub trait RowsColumnTypeDatabaseTypeName {
    /// Database type name, e.g. `VARCHAR`.
    fn column_type_database_type_name(&self, index: usize) -> String;
}

/// Rows reporting the length of variable length columns.
pub trait RowsColumnTypeLength {
    /// Column length, `None` for fixed length types.
    fn column_type_length(&self, index: usize) -> Option<u64>;
}

/// Rows reporting column nullability.
pub trait RowsColumnTypeNullable {
    /// Whether the column is nullable, `None` when unknown.
    fn column_type_nullable(&self, index: usize) -> Option<bool>;
}

/// Rows reporting precision and scale of decimal columns.
pub trait RowsColumnTypePrecisionScale {
    /// `(precision, scale)`, `None` when not applicable.
    fn column_type_precision_scale(&self, index: usize) -> Option<(i64, i64)>;
}

/// Rows reporting the kind of value each column scans into.
pub trait RowsColumnTypeScanType {
    /// Value kind of the column.
    fn column_type_scan_type(&self, index: usize) -> ValueKind;
}

/// A transaction.
pub trait Tx: Send + Sync {
    /// Commits the transaction.
    fn commit(&self) -> Result<()>;

    /// Rolls the transaction back.
    fn rollback(&self) -> Result<()>;
}
