//! Errors returned to producers.

use std::{error, fmt};

/// Reason an item was refused by [`add`](crate::BatchAggregator::add).
///
/// The rejected item rides along inside the error so the producer can decide
/// its own retry or backoff policy without cloning every submission.
pub enum AddError<T> {
    /// The ingress queue is at capacity. Transient: the consumer pipeline is
    /// saturated and the producer should back off.
    Full(T),
    /// The aggregator has been shut down. Permanent for this aggregator.
    Closed(T),
}

impl<T> AddError<T> {
    /// Returns the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            AddError::Full(item) | AddError::Closed(item) => item,
        }
    }

    /// Whether the rejection was transient backpressure.
    pub fn is_full(&self) -> bool {
        matches!(self, AddError::Full(_))
    }

    /// Whether the aggregator was already shut down.
    pub fn is_closed(&self) -> bool {
        matches!(self, AddError::Closed(_))
    }
}

// Manual impls keep `T` free of `Debug`/`Display` bounds, the same shape the
// channel errors underneath this crate use.
impl<T> fmt::Debug for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddError::Full(_) => write!(f, "Full(..)"),
            AddError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

impl<T> fmt::Display for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddError::Full(_) => write!(f, "ingress queue is full"),
            AddError::Closed(_) => write!(f, "aggregator is closed"),
        }
    }
}

impl<T> error::Error for AddError<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_item_is_recoverable() {
        let err: AddError<String> = AddError::Full("payload".to_string());
        assert!(err.is_full());
        assert!(!err.is_closed());
        assert_eq!(err.into_inner(), "payload");

        let err: AddError<String> = AddError::Closed("payload".to_string());
        assert!(err.is_closed());
        assert_eq!(err.into_inner(), "payload");
    }

    #[test]
    fn display_does_not_leak_the_item() {
        struct Opaque;

        assert_eq!(AddError::Full(Opaque).to_string(), "ingress queue is full");
        assert_eq!(
            AddError::Closed(Opaque).to_string(),
            "aggregator is closed"
        );
        assert_eq!(format!("{:?}", AddError::Full(Opaque)), "Full(..)");
    }
}
