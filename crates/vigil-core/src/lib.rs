//! Shared building blocks for Vigil.
//!
//! This crate holds everything the higher layers agree on:
//!
//! - **Types** ([`Session`], [`Timestamp`], [`PendingActionKind`]): the
//!   credential record and the deferred-operation tags.
//! - **Clock** ([`clock::now`]): wall-clock milliseconds, derived from the
//!   Tokio clock under the `test-util` feature so paused tests control expiry.
//! - **Storage** ([`KeyValueStore`], [`MemoryStore`], [`SessionStore`]): the
//!   get/set/remove port and the persisted session record on top of it.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how records become strings.
//! - **Connectivity** ([`Connectivity`]): the shared online/offline signal.
//!
//! # Architecture
//!
//! ```text
//! vigil-retry ← vigil-session ← vigil-recovery ← vigil
//!      ↖              ↑               ↗
//!               vigil-core (this crate)
//! ```

#![allow(async_fn_in_trait)]

pub mod clock;
mod codec;
mod connectivity;
mod error;
mod store;
mod types;

pub use codec::{Codec, JsonCodec};
pub use connectivity::Connectivity;
pub use error::StoreError;
pub use store::{KeyValueStore, MemoryStore, PersistedSession, SessionStore};
pub use types::{PendingActionKind, Session, Timestamp};
