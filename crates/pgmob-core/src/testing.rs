//! An in-memory executor for tests and examples.
//!
//! [`ScriptedExecutor`] answers queries from canned rows chosen by SQL
//! substring and records everything it is asked to run. Clones share state,
//! so a test can keep one handle while the cluster owns another.

use crate::error::{Error, ExecutionError, Result};
use crate::executor::{Executor, RenderedStatement};
use crate::row::{ColumnInfo, Row};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Build rows that share one set of column names.
pub fn rows(columns: &[&str], data: Vec<Vec<Value>>) -> Vec<Row> {
    let info = Arc::new(ColumnInfo::new(
        columns.iter().map(|c| (*c).to_string()).collect(),
    ));
    data.into_iter()
        .map(|values| Row::with_columns(Arc::clone(&info), values))
        .collect()
}

#[derive(Debug)]
struct Failure {
    pattern: String,
    message: String,
    sqlstate: Option<String>,
}

/// Everything a [`ScriptedExecutor`] has seen and will answer.
#[derive(Debug, Default)]
pub struct ScriptState {
    /// Statements run through `query`, in order
    pub queries: Vec<RenderedStatement>,
    /// Statements run through `execute`, including those inside batches
    pub executed: Vec<RenderedStatement>,
    /// Every `execute_batch` call, as sent
    pub batches: Vec<Vec<RenderedStatement>>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    responses: Vec<(String, Vec<Row>)>,
    once: VecDeque<(String, Vec<Row>)>,
    failures: Vec<Failure>,
}

impl ScriptState {
    fn answer(&mut self, sql: &str) -> Vec<Row> {
        if let Some(pos) = self.once.iter().position(|(p, _)| sql.contains(p.as_str())) {
            if let Some((_, rows)) = self.once.remove(pos) {
                return rows;
            }
        }
        self.responses
            .iter()
            .rev()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }

    fn check(&self, sql: &str) -> Result<()> {
        match self.failures.iter().find(|f| sql.contains(f.pattern.as_str())) {
            Some(failure) => {
                let mut err = ExecutionError::new(failure.message.clone()).with_sql(sql);
                err.sqlstate.clone_from(&failure.sqlstate);
                Err(Error::Execution(err))
            }
            None => Ok(()),
        }
    }
}

/// Executor backed by canned responses.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the shared state for inspection.
    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer every query containing `pattern` with `rows`.
    ///
    /// Later registrations take precedence over earlier ones.
    pub fn respond(&self, pattern: impl Into<String>, rows: Vec<Row>) -> &Self {
        self.state().responses.push((pattern.into(), rows));
        self
    }

    /// Answer the next query containing `pattern` with `rows`, once.
    pub fn respond_once(&self, pattern: impl Into<String>, rows: Vec<Row>) -> &Self {
        self.state().once.push_back((pattern.into(), rows));
        self
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>, message: impl Into<String>) -> &Self {
        self.state().failures.push(Failure {
            pattern: pattern.into(),
            message: message.into(),
            sqlstate: None,
        });
        self
    }

    /// Fail every statement containing `pattern` with a SQLSTATE.
    pub fn fail_with_state(
        &self,
        pattern: impl Into<String>,
        message: impl Into<String>,
        sqlstate: impl Into<String>,
    ) -> &Self {
        self.state().failures.push(Failure {
            pattern: pattern.into(),
            message: message.into(),
            sqlstate: Some(sqlstate.into()),
        });
        self
    }

    /// Stop failing statements.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Texts of all executed (non-query) statements, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.state().executed.iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Texts of all queries, in order.
    pub fn query_sql(&self) -> Vec<String> {
        self.state().queries.iter().map(|(sql, _)| sql.clone()).collect()
    }

    /// Number of batches sent.
    pub fn batch_count(&self) -> usize {
        self.state().batches.len()
    }
}

impl Executor for ScriptedExecutor {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut state = self.state();
        state.queries.push((sql.to_string(), params.to_vec()));
        state.check(sql)?;
        Ok(state.answer(sql))
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut state = self.state();
        state.executed.push((sql.to_string(), params.to_vec()));
        state.check(sql)?;
        Ok(1)
    }

    fn begin(&self) -> Result<()> {
        self.state().begins += 1;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.state().commits += 1;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.state().rollbacks += 1;
        Ok(())
    }

    fn execute_batch(&self, statements: &[RenderedStatement]) -> Result<()> {
        self.state().batches.push(statements.to_vec());
        self.begin()?;
        for (sql, params) in statements {
            if let Err(err) = self.execute(sql, params) {
                self.rollback()?;
                return Err(err);
            }
        }
        self.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_by_substring() {
        let exec = ScriptedExecutor::new();
        exec.respond("pg_roles", rows(&["name"], vec![vec!["a".into()]]));
        let got = exec.query("SELECT * FROM pg_roles", &[]).unwrap();
        assert_eq!(got.len(), 1);
        assert!(exec.query("SELECT 1", &[]).unwrap().is_empty());
        assert_eq!(exec.query_sql().len(), 2);
    }

    #[test]
    fn test_once_takes_precedence() {
        let exec = ScriptedExecutor::new();
        exec.respond("x", rows(&["n"], vec![vec![1i32.into()]]));
        exec.respond_once("x", Vec::new());
        assert!(exec.query("x", &[]).unwrap().is_empty());
        assert_eq!(exec.query("x", &[]).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_failure_rolls_back() {
        let exec = ScriptedExecutor::new();
        exec.fail_with_state("RENAME", "permission denied", "42501");
        let batch = vec![
            ("ALTER ROLE a NOLOGIN".to_string(), Vec::new()),
            ("ALTER ROLE a RENAME TO b".to_string(), Vec::new()),
            ("ALTER ROLE b LOGIN".to_string(), Vec::new()),
        ];
        let err = exec.execute_batch(&batch).unwrap_err();
        assert_eq!(err.sqlstate(), Some("42501"));

        let state = exec.state();
        assert_eq!(state.executed.len(), 2);
        assert_eq!((state.begins, state.commits, state.rollbacks), (1, 0, 1));
        assert_eq!(state.batches.len(), 1);
    }

    #[test]
    fn test_shared_state_across_clones() {
        let exec = ScriptedExecutor::new();
        let boxed: Box<dyn Executor> = Box::new(exec.clone());
        boxed.execute("SELECT pg_reload_conf()", &[]).unwrap();
        assert_eq!(exec.executed_sql(), vec!["SELECT pg_reload_conf()"]);
    }
}
