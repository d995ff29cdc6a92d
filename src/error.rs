//! Loop-level error taxonomy.

use thiserror::Error;

use crate::buffer::CapacityFault;
use crate::record::DecodeError;
use crate::session::{ConnectError, ReceiveError};

/// Any fault that ends the current connection.
///
/// Every variant except a cancelled receive is handled by reconnecting.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Receive(#[from] ReceiveError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("record exceeds buffer: {0}")]
    Capacity(#[from] CapacityFault),
}

impl FeedError {
    /// Whether this error only reports that cancellation was requested.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Receive(ReceiveError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn cancelled_receive_is_cancellation() {
        assert!(FeedError::from(ReceiveError::Cancelled).is_cancellation());
        assert!(!FeedError::from(ReceiveError::NotConnected).is_cancellation());
        assert!(!FeedError::from(CapacityFault { capacity: 4 }).is_cancellation());
    }

    #[rstest]
    fn capacity_message_names_the_limit() {
        let err = FeedError::from(CapacityFault { capacity: 16 });
        assert!(err.to_string().contains("16"), "{err}");
    }
}
