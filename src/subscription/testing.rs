use crate::subscription::{TopicTransport, TransportError};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Subscribe(String),
    Unsubscribe(String),
}

/// In-memory transport that records every request
#[derive(Debug, Default)]
pub(crate) struct RecordingTransport {
    pub calls: Vec<Call>,
    pub fail_subscribe: HashSet<String>,
    pub fail_unsubscribe: HashSet<String>,
    pub disconnected: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribes(&self, topic: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == Call::Subscribe(topic.to_string()))
            .count()
    }

    pub fn unsubscribes(&self, topic: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == Call::Unsubscribe(topic.to_string()))
            .count()
    }
}

impl TopicTransport for RecordingTransport {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }
        if self.fail_subscribe.contains(topic) {
            return Err(TransportError::Rejected {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.calls.push(Call::Subscribe(topic.to_string()));
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        if self.disconnected {
            return Err(TransportError::Disconnected);
        }
        if self.fail_unsubscribe.contains(topic) {
            return Err(TransportError::Rejected {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.calls.push(Call::Unsubscribe(topic.to_string()));
        Ok(())
    }
}
