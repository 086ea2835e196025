//! Response encodings for subscription streams.
//!
//! - `serializer`: the `Serializer` variants turning one message into bytes.
//! - `negotiate`: picks a `Serializer` from an `Accept` header.

pub mod negotiate;
pub mod serializer;

pub use negotiate::negotiate;
pub use serializer::Serializer;

#[cfg(test)]
mod tests;
