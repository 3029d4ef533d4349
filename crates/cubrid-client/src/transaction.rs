//! Transaction support.
//!
//! This module provides transaction isolation levels and a scoped
//! [`Transaction`] handle bound to a [`Session`].

use crate::error::Result;
use crate::session::Session;
use crate::statement::Statement;

/// Transaction isolation level.
///
/// Values are the server's isolation ids as sent with the isolation-level
/// session parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum IsolationLevel {
    /// Committed schema, uncommitted rows.
    ReadUncommitted = 3,

    /// Committed schema and rows (server default).
    #[default]
    ReadCommitted = 4,

    /// Rows read stay unchanged until the transaction ends.
    RepeatableRead = 5,

    /// Full isolation.
    Serializable = 6,
}

impl IsolationLevel {
    /// Wire id of this level.
    #[must_use]
    pub fn id(self) -> i32 {
        self as i32
    }

    /// Map a wire id back to a level.
    #[must_use]
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            3 => Some(Self::ReadUncommitted),
            4 => Some(Self::ReadCommitted),
            5 => Some(Self::RepeatableRead),
            6 => Some(Self::Serializable),
            _ => None,
        }
    }

    /// Level name as written in SQL.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An open transaction.
///
/// Created by [`Session::begin_transaction`], which switches auto-commit
/// off. [`commit`](Self::commit) and [`rollback`](Self::rollback) end it and
/// restore the session's previous auto-commit mode.
///
/// Dropping a transaction that was neither committed nor rolled back
/// schedules a rollback that the session sends before its next request.
pub struct Transaction<'a> {
    session: &'a mut Session,
    restore_auto_commit: bool,
    isolation_level: Option<IsolationLevel>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        restore_auto_commit: bool,
        isolation_level: Option<IsolationLevel>,
    ) -> Self {
        Self {
            session,
            restore_auto_commit,
            isolation_level,
            finished: false,
        }
    }

    /// The isolation level requested when the transaction began.
    #[must_use]
    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// The session this transaction runs on.
    pub fn session(&mut self) -> &mut Session {
        self.session
    }

    /// Prepare a statement inside this transaction.
    pub async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        Statement::prepare(self.session, sql).await
    }

    /// Commit and end the transaction.
    ///
    /// If the commit fails the transaction is treated as dropped: a rollback
    /// is scheduled and the previous auto-commit mode is restored.
    pub async fn commit(mut self) -> Result<()> {
        self.session.commit().await?;
        self.finished = true;
        self.session.restore_auto_commit(self.restore_auto_commit);
        Ok(())
    }

    /// Roll back and end the transaction.
    pub async fn rollback(mut self) -> Result<()> {
        self.session.rollback().await?;
        self.finished = true;
        self.session.restore_auto_commit(self.restore_auto_commit);
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("transaction not completed; rolling back");
            self.session.schedule_rollback();
            self.session.restore_auto_commit(self.restore_auto_commit);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("isolation_level", &self.isolation_level)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_ids() {
        for level in [
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ] {
            assert_eq!(IsolationLevel::from_id(level.id()), Some(level));
        }
        assert_eq!(IsolationLevel::from_id(1), None);
        assert_eq!(IsolationLevel::default().id(), 4);
        assert_eq!(IsolationLevel::Serializable.to_string(), "SERIALIZABLE");
    }
}
