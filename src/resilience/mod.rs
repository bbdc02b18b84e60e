//! Resilience helpers.
//!
//! Storage cleanup runs after the request that created an object is gone,
//! so nothing waits on it; failed deletes are retried with backoff.

pub mod backoff;
