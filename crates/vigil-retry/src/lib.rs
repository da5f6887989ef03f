//! Retry execution with named policies and circuit breakers.
//!
//! A caller hands [`RetryExecutor::execute_with_retry`] a zero-argument
//! async operation, the name of a [`RetryPolicy`], and optionally the name
//! of a service. The executor runs the operation until it succeeds, fails
//! with a non-retryable error, or runs out of attempts, sleeping with
//! exponential backoff plus jitter in between.
//!
//! When the service has a registered [`CircuitBreaker`], every attempt
//! goes through it. After enough consecutive failures the breaker opens
//! and further calls fail fast with [`RetryError::CircuitOpen`] until its
//! reset timeout elapses.
//!
//! ```text
//!   Closed ──(threshold failures)──→ Open ──(reset timeout)──→ HalfOpen
//!     ↑                               ↑                          │
//!     └──────────(success)────────────┼──────────────────────────┤
//!                                     └────────(failure)─────────┘
//! ```
//!
//! Nothing here knows about sessions; the session layer is one consumer.

mod breaker;
mod classify;
mod error;
mod executor;
mod policy;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classify::{Classify, ErrorKind, TRANSIENT_PHRASES};
pub use error::RetryError;
pub use executor::RetryExecutor;
pub use policy::RetryPolicy;
