//! Optional capabilities of backend objects.
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use crate::driver::{Conn, Driver, Rows, Stmt};

/// A set of optional capabilities implemented by a backend object.
///
/// The set is computed once, when the object is wrapped, by probing every
/// `as_*` accessor of the object. The wrapped facade answers the same
/// accessors according to this set, so probing the facade gives the same
/// result as probing the original object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    /// [`DriverContext`](crate::driver::DriverContext).
    pub const DRIVER_CONTEXT: Capabilities = Capabilities(1 << 0);

    /// [`Pinger`](crate::driver::Pinger).
    pub const PINGER: Capabilities = Capabilities(1 << 1);
    /// [`ExecerContext`](crate::driver::ExecerContext).
    pub const EXECER_CONTEXT: Capabilities = Capabilities(1 << 2);
    /// [`QueryerContext`](crate::driver::QueryerContext).
    pub const QUERYER_CONTEXT: Capabilities = Capabilities(1 << 3);
    /// [`ConnPrepareContext`](crate::driver::ConnPrepareContext).
    pub const PREPARE_CONTEXT: Capabilities = Capabilities(1 << 4);
    /// [`ConnBeginTx`](crate::driver::ConnBeginTx).
    pub const BEGIN_TX: Capabilities = Capabilities(1 << 5);
    /// [`NamedValueChecker`](crate::driver::NamedValueChecker), on connections
    /// and statements.
    pub const NAMED_VALUE_CHECKER: Capabilities = Capabilities(1 << 6);
    /// [`SessionResetter`](crate::driver::SessionResetter).
    pub const SESSION_RESETTER: Capabilities = Capabilities(1 << 7);

    /// [`StmtExecContext`](crate::driver::StmtExecContext).
    pub const STMT_EXEC_CONTEXT: Capabilities = Capabilities(1 << 8);
    /// [`StmtQueryContext`](crate::driver::StmtQueryContext).
    pub const STMT_QUERY_CONTEXT: Capabilities = Capabilities(1 << 9);
    /// [`ColumnConverter`](crate::driver::ColumnConverter).
    pub const COLUMN_CONVERTER: Capabilities = Capabilities(1 << 10);

    /// [`RowsNextResultSet`](crate::driver::RowsNextResultSet).
    pub const NEXT_RESULT_SET: Capabilities = Capabilities(1 << 11);
    /// [`RowsColumnTypeDatabaseTypeName`](crate::driver::RowsColumnTypeDatabaseTypeName).
    pub const COLUMN_TYPE_DATABASE_TYPE_NAME: Capabilities = Capabilities(1 << 12);
    /// [`RowsColumnTypeLength`](crate::driver::RowsColumnTypeLength).
    pub const COLUMN_TYPE_LENGTH: Capabilities = Capabilities(1 << 13);
    /// [`RowsColumnTypeNullable`](crate::driver::RowsColumnTypeNullable).
    pub const COLUMN_TYPE_NULLABLE: Capabilities = Capabilities(1 << 14);
    /// [`RowsColumnTypePrecisionScale`](crate::driver::RowsColumnTypePrecisionScale).
    pub const COLUMN_TYPE_PRECISION_SCALE: Capabilities = Capabilities(1 << 15);
    /// [`RowsColumnTypeScanType`](crate::driver::RowsColumnTypeScanType).
    pub const COLUMN_TYPE_SCAN_TYPE: Capabilities = Capabilities(1 << 16);

    /// Every capability a driver may have.
    pub const DRIVER: Capabilities = Capabilities::DRIVER_CONTEXT;

    /// Every capability a connection may have.
    pub const CONN: Capabilities = Capabilities(
        Capabilities::PINGER.0
            | Capabilities::EXECER_CONTEXT.0
            | Capabilities::QUERYER_CONTEXT.0
            | Capabilities::PREPARE_CONTEXT.0
            | Capabilities::BEGIN_TX.0
            | Capabilities::NAMED_VALUE_CHECKER.0
            | Capabilities::SESSION_RESETTER.0,
    );

    /// Every capability a statement may have.
    pub const STMT: Capabilities = Capabilities(
        Capabilities::STMT_EXEC_CONTEXT.0
            | Capabilities::STMT_QUERY_CONTEXT.0
            | Capabilities::COLUMN_CONVERTER.0
            | Capabilities::NAMED_VALUE_CHECKER.0,
    );

    /// Every capability rows may have.
    pub const ROWS: Capabilities = Capabilities(
        Capabilities::NEXT_RESULT_SET.0
            | Capabilities::COLUMN_TYPE_DATABASE_TYPE_NAME.0
            | Capabilities::COLUMN_TYPE_LENGTH.0
            | Capabilities::COLUMN_TYPE_NULLABLE.0
            | Capabilities::COLUMN_TYPE_PRECISION_SCALE.0
            | Capabilities::COLUMN_TYPE_SCAN_TYPE.0,
    );

    const NAMES: [(Capabilities, &'static str); 17] = [
        (Capabilities::DRIVER_CONTEXT, "DriverContext"),
        (Capabilities::PINGER, "Pinger"),
        (Capabilities::EXECER_CONTEXT, "ExecerContext"),
        (Capabilities::QUERYER_CONTEXT, "QueryerContext"),
        (Capabilities::PREPARE_CONTEXT, "ConnPrepareContext"),
        (Capabilities::BEGIN_TX, "ConnBeginTx"),
        (Capabilities::NAMED_VALUE_CHECKER, "NamedValueChecker"),
        (Capabilities::SESSION_RESETTER, "SessionResetter"),
        (Capabilities::STMT_EXEC_CONTEXT, "StmtExecContext"),
        (Capabilities::STMT_QUERY_CONTEXT, "StmtQueryContext"),
        (Capabilities::COLUMN_CONVERTER, "ColumnConverter"),
        (Capabilities::NEXT_RESULT_SET, "RowsNextResultSet"),
        (
            Capabilities::COLUMN_TYPE_DATABASE_TYPE_NAME,
            "RowsColumnTypeDatabaseTypeName",
        ),
        (Capabilities::COLUMN_TYPE_LENGTH, "RowsColumnTypeLength"),
        (Capabilities::COLUMN_TYPE_NULLABLE, "RowsColumnTypeNullable"),
        (
            Capabilities::COLUMN_TYPE_PRECISION_SCALE,
            "RowsColumnTypePrecisionScale",
        ),
        (Capabilities::COLUMN_TYPE_SCAN_TYPE, "RowsColumnTypeScanType"),
    ];

    /// The empty set.
    pub const fn empty() -> Self {
        Capabilities(0)
    }

    /// Returns `true` if no capability is set.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every capability of `other` is also in `self`.
    pub const fn contains(&self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns a copy with `other` added or removed.
    pub const fn with(&self, other: Capabilities, enabled: bool) -> Self {
        if enabled {
            Capabilities(self.0 | other.0)
        } else {
            Capabilities(self.0 & !other.0)
        }
    }

    /// Iterates over every subset of `self`, starting with the empty set.
    pub fn subsets(self) -> impl Iterator<Item = Capabilities> {
        let mask = self.0;
        let mut next = Some(0u32);

        std::iter::from_fn(move || {
            let current = next?;
            // Enumerate submasks in increasing order.
            next = if current == mask {
                None
            } else {
                Some((current.wrapping_sub(mask)) & mask)
            };

            Some(Capabilities(current))
        })
    }

    /// Probes a driver.
    pub fn of_driver(driver: &dyn Driver) -> Self {
        Capabilities::empty().with(
            Capabilities::DRIVER_CONTEXT,
            driver.as_driver_context().is_some(),
        )
    }

    /// Probes a connection.
    pub fn of_conn(conn: &dyn Conn) -> Self {
        Capabilities::empty()
            .with(Capabilities::PINGER, conn.as_pinger().is_some())
            .with(
                Capabilities::EXECER_CONTEXT,
                conn.as_execer_context().is_some(),
            )
            .with(
                Capabilities::QUERYER_CONTEXT,
                conn.as_queryer_context().is_some(),
            )
            .with(
                Capabilities::PREPARE_CONTEXT,
                conn.as_prepare_context().is_some(),
            )
            .with(Capabilities::BEGIN_TX, conn.as_begin_tx().is_some())
            .with(
                Capabilities::NAMED_VALUE_CHECKER,
                conn.as_named_value_checker().is_some(),
            )
            .with(
                Capabilities::SESSION_RESETTER,
                conn.as_session_resetter().is_some(),
            )
    }

    /// Probes a statement.
    pub fn of_stmt(stmt: &dyn Stmt) -> Self {
        Capabilities::empty()
            .with(
                Capabilities::STMT_EXEC_CONTEXT,
                stmt.as_exec_context().is_some(),
            )
            .with(
                Capabilities::STMT_QUERY_CONTEXT,
                stmt.as_query_context().is_some(),
            )
            .with(
                Capabilities::COLUMN_CONVERTER,
                stmt.as_column_converter().is_some(),
            )
            .with(
                Capabilities::NAMED_VALUE_CHECKER,
                stmt.as_named_value_checker().is_some(),
            )
    }

    /// Probes rows.
    pub fn of_rows(rows: &dyn Rows) -> Self {
        Capabilities::empty()
            .with(
                Capabilities::NEXT_RESULT_SET,
                rows.as_next_result_set().is_some(),
            )
            .with(
                Capabilities::COLUMN_TYPE_DATABASE_TYPE_NAME,
                rows.as_column_type_database_type_name().is_some(),
            )
            .with(
                Capabilities::COLUMN_TYPE_LENGTH,
                rows.as_column_type_length().is_some(),
            )
            .with(
                Capabilities::COLUMN_TYPE_NULLABLE,
                rows.as_column_type_nullable().is_some(),
            )
            .with(
                Capabilities::COLUMN_TYPE_PRECISION_SCALE,
                rows.as_column_type_precision_scale().is_some(),
            )
            .with(
                Capabilities::COLUMN_TYPE_SCAN_TYPE,
                rows.as_column_type_scan_type().is_some(),
            )
    }
}

impl BitAnd for Capabilities {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Not for Capabilities {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (capability, name) in Capabilities::NAMES {
            if self.contains(capability) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        if first {
            f.write_str("none")?;
        }

        Ok(())
    }
}
