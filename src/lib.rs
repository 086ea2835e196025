//! # http2broker
//!
//! `http2broker` exposes message brokers over plain HTTP. A `GET` opens a
//! long-lived response that streams every broker message matching a topic
//! pattern, paced by how fast the client reads. A `POST` publishes its body to
//! a routing key. AMQP, MQTT, NATS and Redis brokers are supported, plus an
//! in-process broker for development.
//!
//! ## Core Modules
//!
//! - `backend`: the broker adapter contract and one adapter per broker kind.
//! - `client`: session cookie handling.
//! - `config`: loading and merging server and backend configuration.
//! - `controller`: per-backend request entry points and the `Gateway`.
//! - `encoding`: stream serializers and `Accept` negotiation.
//! - `publisher`: buffering and publishing `POST` bodies.
//! - `session`: per-client broker connections and their registry.
//! - `subscription`: the bridge between broker push and HTTP pull.
//! - `transport`: the HTTP server.
//! - `utils`: error types and logging setup.

pub mod backend;
pub mod client;
pub mod config;
pub mod controller;
pub mod encoding;
pub mod publisher;
pub mod session;
pub mod subscription;
pub mod transport;
pub mod utils;
