// batch/mod.rs

//! Concurrent batch processing: the fan-out runner, lookup coalescing and
//! the customer external ID update workflow built on them.

pub mod customer_update;
pub mod runner;
pub mod single_flight;

pub use customer_update::{CustomerRecord, CustomerUpdater, UpdateMode, UpdateResult, UpdateState, UpdateSummary};
pub use runner::{BatchOutcome, CancelToken, Completed, FanOutRunner, ItemOutcome, Progress};
pub use single_flight::SingleFlight;
