//! Per-handle transaction context.
//!
//! A [`TxContext`] binds at most one connection, held as an open
//! `sqlx::Transaction`. Nested `begin` calls only deepen the scope; the
//! outermost `commit` does the physical commit and hands back the cache
//! invalidations queued while the transaction ran.

use std::fmt;
use std::mem;

use emissary_data::DataError;
use sqlx::AnyConnection;
use sqlx::{Any, Transaction};

use crate::datasource::DataSource;
use crate::error::SqlxErrorExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Inactive,
    Active,
    /// Rolled back; only `end_transaction` is accepted until the scope closes.
    MarkedRollback,
    /// Committed; only `end_transaction` is accepted until the scope closes.
    Completed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Inactive => "inactive",
            TransactionStatus::Active => "active",
            TransactionStatus::MarkedRollback => "marked for rollback",
            TransactionStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Cache work deferred until commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invalidation {
    Key(String),
    Class(String),
    DataSource,
}

enum TxState {
    Inactive,
    Active(Transaction<'static, Any>),
    MarkedRollback,
    Completed,
}

pub(crate) struct TxContext {
    state: TxState,
    depth: u32,
    pending: Vec<Invalidation>,
}

impl TxContext {
    pub(crate) fn new() -> Self {
        Self {
            state: TxState::Inactive,
            depth: 0,
            pending: Vec::new(),
        }
    }

    pub(crate) fn status(&self) -> TransactionStatus {
        match self.state {
            TxState::Inactive => TransactionStatus::Inactive,
            TxState::Active(_) => TransactionStatus::Active,
            TxState::MarkedRollback => TransactionStatus::MarkedRollback,
            TxState::Completed => TransactionStatus::Completed,
        }
    }

    pub(crate) fn depth(&self) -> u32 {
        self.depth
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(self.state, TxState::Active(_))
    }

    /// The bound connection, if a transaction is open.
    pub(crate) fn connection(&mut self) -> Option<&mut AnyConnection> {
        match &mut self.state {
            TxState::Active(tx) => Some(&mut **tx),
            _ => None,
        }
    }

    /// Entity operations are refused once the transaction has been decided.
    pub(crate) fn ensure_usable(&self) -> Result<(), DataError> {
        match self.status() {
            TransactionStatus::Inactive | TransactionStatus::Active => Ok(()),
            status => Err(DataError::transaction_state(format!(
                "transaction is {status}; call end_transaction first"
            ))),
        }
    }

    pub(crate) fn queue(&mut self, invalidation: Invalidation) {
        if !self.pending.contains(&invalidation) {
            self.pending.push(invalidation);
        }
    }

    pub(crate) async fn begin(&mut self, source: &DataSource) -> Result<(), DataError> {
        match self.state {
            TxState::Inactive => {
                let tx = source
                    .pool()
                    .begin()
                    .await
                    .map_err(|e| {
                        e.into_data_error(format!("begin transaction on {}", source.name()))
                    })?;
                self.state = TxState::Active(tx);
                self.depth = 1;
                tracing::debug!(data_source = source.name(), "transaction started");
                Ok(())
            }
            TxState::Active(_) => {
                self.depth += 1;
                tracing::debug!(
                    data_source = source.name(),
                    depth = self.depth,
                    "joined transaction"
                );
                Ok(())
            }
            TxState::MarkedRollback | TxState::Completed => {
                // Still counted so the caller's end_transaction stays balanced.
                self.depth += 1;
                Err(DataError::transaction_state(format!(
                    "cannot begin: transaction is {}",
                    self.status()
                )))
            }
        }
    }

    /// Returns the queued invalidations when a physical commit happened,
    /// `None` for an inner scope.
    pub(crate) async fn commit(
        &mut self,
        data_source: &str,
    ) -> Result<Option<Vec<Invalidation>>, DataError> {
        match mem::replace(&mut self.state, TxState::Inactive) {
            TxState::Inactive => Err(DataError::transaction_state(
                "commit without an active transaction",
            )),
            TxState::Active(tx) if self.depth > 1 => {
                self.state = TxState::Active(tx);
                Ok(None)
            }
            TxState::Active(tx) => match tx.commit().await {
                Ok(()) => {
                    self.state = TxState::Completed;
                    tracing::debug!(data_source, "transaction committed");
                    Ok(Some(mem::take(&mut self.pending)))
                }
                Err(err) => {
                    self.state = TxState::MarkedRollback;
                    self.pending.clear();
                    Err(err.into_data_error(format!("commit on {data_source}")))
                }
            },
            TxState::MarkedRollback => {
                self.state = TxState::MarkedRollback;
                Err(DataError::transaction_state("transaction is marked for rollback"))
            }
            TxState::Completed => {
                self.state = TxState::Completed;
                Err(DataError::transaction_state("transaction already committed"))
            }
        }
    }

    /// Roll back at any depth; the whole transaction is doomed.
    pub(crate) async fn rollback(&mut self, data_source: &str) -> Result<(), DataError> {
        match mem::replace(&mut self.state, TxState::Inactive) {
            TxState::Active(tx) => {
                self.state = TxState::MarkedRollback;
                self.pending.clear();
                tracing::debug!(data_source, depth = self.depth, "transaction rolled back");
                tx.rollback()
                    .await
                    .map_err(|e| e.into_data_error(format!("rollback on {data_source}")))
            }
            TxState::MarkedRollback => {
                self.state = TxState::MarkedRollback;
                Ok(())
            }
            TxState::Inactive => Err(DataError::transaction_state(
                "rollback without an active transaction",
            )),
            TxState::Completed => {
                self.state = TxState::Completed;
                Err(DataError::transaction_state("transaction already committed"))
            }
        }
    }

    /// Close one scope. The outermost close releases the connection,
    /// rolling back anything still open.
    pub(crate) async fn end(&mut self, data_source: &str) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return;
        }
        if let TxState::Active(tx) = mem::replace(&mut self.state, TxState::Inactive) {
            if let Err(err) = tx.rollback().await {
                tracing::warn!(data_source, error = %err, "rollback on release failed");
            }
        }
        self.pending.clear();
        tracing::debug!(data_source, "transaction context released");
    }
}

impl fmt::Debug for TxContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxContext")
            .field("status", &self.status())
            .field("depth", &self.depth)
            .field("pending", &self.pending.len())
            .finish()
    }
}
