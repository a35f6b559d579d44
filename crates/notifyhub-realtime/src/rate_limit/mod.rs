//! Fixed-window admission control.

pub mod limiter;

pub use limiter::{RateDecision, RateLimiter};
