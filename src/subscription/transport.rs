use std::fmt;

/// Subscribe/unsubscribe capability provided by the pub/sub client.
///
/// Inbound messages are not delivered through this trait; the client feeds
/// them to the controller's event loop separately.
pub trait TopicTransport {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;
}

/// Failures reported by a `TopicTransport`
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Client is not connected to the broker
    Disconnected,
    /// Request could not be queued or was refused
    Rejected { topic: String, reason: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Disconnected => write!(f, "transport is disconnected"),
            TransportError::Rejected { topic, reason } => {
                write!(f, "request for topic '{}' rejected: {}", topic, reason)
            }
        }
    }
}

impl std::error::Error for TransportError {}
