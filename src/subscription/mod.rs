// Topic subscription bookkeeping

mod registry;
mod transport;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
mod tests;

pub use registry::{SubscriptionSnapshot, TopicSubscription, TopicSubscriptionRegistry};
pub use transport::{TopicTransport, TransportError};
