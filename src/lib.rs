//! Tollgate - Failover-Aware Request Rate Limiting
//!
//! This crate classifies incoming requests into four quadrants (public or
//! protected route, anonymous or authenticated caller), derives a counter
//! key per caller, and counts attempts in fixed windows. Counters live in a
//! primary store (usually Redis) with an in-process secondary store that
//! takes over with a relaxed quota while the primary is unreachable.

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ratelimit;
