//! # Lockwarden TTLock
//!
//! Talks to the TTLock open platform (`euapi.ttlock.com`) and wraps it
//! into a single-attempt [`Actuator`](lockwarden_core::traits::Actuator)
//! that caches the access token and the target lock id.

pub mod actuator;
pub mod client;

pub use actuator::LockActuator;
pub use client::TtlockClient;
