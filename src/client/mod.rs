//! The `client` module identifies the HTTP client behind a request.
//!
//! Clients are recognised by a session cookie. A request without one gets a
//! freshly minted id, and every response refreshes the cookie so the id
//! stays stable across requests.

pub mod session_cookie;
pub use session_cookie::{ClientSession, SessionCookie};

#[cfg(test)]
mod tests;
