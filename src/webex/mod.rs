// webex/mod.rs

//! Thin client over the Webex REST API.
//!
//! Requests go through an [`Executor`] which owns the retry policy, so every
//! call site (single lookups, pagination, batch fan-out) shares the same
//! handling of rate limits and transient failures.

pub mod api;
pub mod client;
pub mod executor;
pub mod models;
pub mod outcome;
pub mod paginate;

pub use client::{ApiRequest, WebexClient, DEFAULT_BASE_URL};
pub use executor::{Executed, Executor, RetryPolicy};
pub use outcome::{ApiFailure, ErrorKind, RequestOutcome};
pub use paginate::Paginator;
