//! Statements paired with their bound parameters.

use crate::composed::{Composable, Composed};
use pgmob_core::error::{Error, Result, UsageErrorKind};
use pgmob_core::{RenderedStatement, Value};
use std::fmt;

/// A composed statement and the values for its placeholders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    sql: Composed,
    params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Composable) -> Self {
        Self {
            sql: sql.compose(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Composable, params: Vec<Value>) -> Self {
        Self {
            sql: sql.compose(),
            params,
        }
    }

    /// Bind the next parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &Composed {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Render for the execution boundary.
    ///
    /// Fails when the number of bound values differs from the number of
    /// placeholders.
    pub fn render(&self) -> Result<RenderedStatement> {
        let slots = self.sql.placeholder_count();
        if slots != self.params.len() {
            return Err(Error::usage(
                UsageErrorKind::Parameters,
                format!(
                    "statement has {} placeholders but {} parameters: {}",
                    slots,
                    self.params.len(),
                    self.sql
                ),
            ));
        }
        Ok((self.sql.render(), self.params.clone()))
    }
}

impl From<Composed> for Statement {
    fn from(sql: Composed) -> Self {
        Self::new(sql)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}
