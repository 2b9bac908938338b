//! Floodgate - Rate Limiting Decision Engine
//!
//! This crate implements the decision core of a rate-limiting service:
//! rule resolution, three interchangeable algorithms (Token Bucket,
//! Sliding Window, Fixed Window) over an atomically-updated counter store,
//! and a streaming analytics aggregator. The transport and authentication
//! boundary that fronts it is expected to live in a separate layer.

pub mod analytics;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod limiter;
pub mod rules;
pub mod store;
