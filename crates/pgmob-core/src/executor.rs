//! The execution boundary.
//!
//! Everything that touches the remote server goes through [`Executor`].
//! The trait is synchronous: each call blocks until the server answers.
//! Connection management, pooling and retries belong to the implementor.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// A rendered statement ready for the driver: text with `$n` placeholders
/// and the values bound to them.
pub type RenderedStatement = (String, Vec<Value>);

/// A capability for running statements against a Postgres server.
///
/// Receivers are `&self` so that one executor can be shared by a cluster
/// handle and every object loaded through it; drivers keep their
/// connection behind interior mutability.
pub trait Executor {
    /// Run a statement that returns rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Open a transaction.
    fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    fn rollback(&self) -> Result<()>;

    /// Run a list of statements as one transaction.
    ///
    /// The first failure rolls the transaction back and is returned as-is.
    /// A rollback failure is logged; the statement's error wins.
    fn execute_batch(&self, statements: &[RenderedStatement]) -> Result<()> {
        self.begin()?;
        for (sql, params) in statements {
            if let Err(err) = self.execute(sql, params) {
                if let Err(rollback_err) = self.rollback() {
                    tracing::warn!(error = %rollback_err, "Rollback after failed batch failed");
                }
                return Err(err);
            }
        }
        self.commit()
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn begin(&self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&self) -> Result<()> {
        (**self).rollback()
    }

    fn execute_batch(&self, statements: &[RenderedStatement]) -> Result<()> {
        (**self).execute_batch(statements)
    }
}
