//! The `utils` module collects the pieces shared by every layer of the gateway.
//!
//! - `error`: the `GatewayError` taxonomy (connect, subscribe, publish, teardown).
//! - `logging`: tracing subscriber setup for the binary and for tests.

pub mod error;
pub mod logging;

pub use error::{GatewayError, Result};

#[cfg(test)]
mod tests;
