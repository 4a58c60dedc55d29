//! Crate-internal tests for the router.

mod support;
