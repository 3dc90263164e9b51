//! Authoritative job registry.
//!
//! The registry owns the job state machine. Its compare-and-set transition
//! is the only cross-worker serialization point in the pipeline: duplicate
//! queue deliveries, racing workers and stale retries all resolve through it.

pub mod error;
pub mod memory;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use memory::MemoryRegistry;
pub use registry::{valid_transition, FailureOutcome, JobRegistry, RegistryConfig};
