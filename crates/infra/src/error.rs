//! Error taxonomy at the service boundary.

use rust_decimal::Decimal;
use thiserror::Error;

use socialstore_core::DomainError;

use crate::command_dispatcher::DispatchError;

/// Error returned by every social store operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Blank ids, past dates, wrong status, missing reason, inactive entities.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: Decimal,
        requested: Decimal,
    },

    /// Optimistic concurrency still failing after the configured retries.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store, bus or serialization failure.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: DispatchError,
    },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg)
            | DomainError::InvariantViolation(msg)
            | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(what) => ServiceError::NotFound(what),
            DomainError::InsufficientStock {
                product,
                available,
                requested,
            } => ServiceError::InsufficientStock {
                product,
                available,
                requested,
            },
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

/// Attach operation context to infrastructure failures.
pub(crate) trait DispatchResultExt<T> {
    fn context(self, context: &str) -> ServiceResult<T>;
}

impl<T> DispatchResultExt<T> for Result<T, DispatchError> {
    fn context(self, context: &str) -> ServiceResult<T> {
        self.map_err(|err| match err {
            DispatchError::Domain(e) => e.into(),
            DispatchError::Concurrency(msg) => ServiceError::Conflict(msg),
            source => ServiceError::Store {
                context: context.to_string(),
                source,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::EventStoreError;
    use rust_decimal_macros::dec;

    #[test]
    fn domain_errors_keep_their_message() {
        let err: ServiceError = DomainError::insufficient_stock("Rice", dec!(3), dec!(5)).into();
        assert_eq!(
            err.to_string(),
            "insufficient stock for Rice: available 3, requested 5"
        );

        let err: ServiceError = DomainError::validation("rejection reason cannot be empty").into();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn store_failures_are_wrapped_with_context() {
        let res: Result<(), DispatchError> = Err(DispatchError::Store(EventStoreError::Unavailable(
            "lock poisoned".to_string(),
        )));
        let err = res.context("failed to confirm delivery").unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to confirm delivery: event store unavailable: lock poisoned"
        );
    }
}
