//! Utilities for testing code built on messaging contexts. They are used by this crate's own
//!  tests, and they are exported for application testing as well, which is why they are part of
//!  the crate's regular (non-#[cfg(test)]) code.

pub mod target;
pub mod event;
