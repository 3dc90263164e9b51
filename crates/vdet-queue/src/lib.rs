//! Job broker.
//!
//! An ordered, at-least-once delivery channel of job references between the
//! submission path and workers. A leased message that is not acknowledged
//! within the visibility window becomes redeliverable; duplicate delivery is
//! made safe by the registry's compare-and-set, not by broker ordering.

pub mod broker;
pub mod error;
pub mod memory;
pub mod redis_broker;

pub use broker::{Broker, BrokerConfig, Lease};
pub use error::{QueueError, QueueResult};
pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;
