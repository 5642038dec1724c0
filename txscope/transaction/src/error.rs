use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use txscope_context::ContextError;

use crate::driver::BoxError;

#[derive(Error, Debug, Diagnostic)]
pub enum TransactionError {
    /// Acquiring or preparing the connection failed while beginning.
    #[error("could not open connection for transaction")]
    CannotCreateTransaction(#[source] BoxError),

    /// The driver rejected a commit or rollback.
    #[error("{task} failed")]
    TransactionSystem {
        task: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("transaction timed out: deadline exceeded by {overdue:?}")]
    TimedOut { overdue: Duration },

    #[error("transaction rolled back because it has been marked as rollback-only")]
    UnexpectedRollback,

    #[error("failed to obtain connection")]
    CannotGetConnection(#[source] BoxError),

    #[error("failed to close connection")]
    CannotCloseConnection(#[source] BoxError),
}

impl TransactionError {
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}

impl From<ContextError> for TransactionError {
    fn from(err: ContextError) -> Self {
        Self::IllegalState(err.to_string())
    }
}

pub type TransactionResult<T> = std::result::Result<T, TransactionError>;

#[cfg(test)]
mod tests {
    use std::error::Error as _;
    use std::io;

    use txscope_context::ResourceKey;

    use super::*;

    #[test]
    fn test_display() {
        let err = TransactionError::TransactionSystem {
            task: "commit",
            source: Box::new(io::Error::other("connection reset")),
        };
        insta::assert_snapshot!(err.to_string(), @"commit failed");
        insta::assert_snapshot!(err.source().unwrap().to_string(), @"connection reset");

        let err = TransactionError::CannotCreateTransaction(Box::new(io::Error::other("refused")));
        insta::assert_snapshot!(err.to_string(), @"could not open connection for transaction");
    }

    #[test]
    fn test_context_error_is_illegal_state() {
        let err: TransactionError = ContextError::AlreadyBound(ResourceKey::new("main")).into();
        assert!(err.is_illegal_state());
        insta::assert_snapshot!(err.to_string(), @"illegal state: a resource is already bound for key [main]");
    }
}
