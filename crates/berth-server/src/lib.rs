//! # berth-server
//!
//! Identity-gated HTTP surface over the Berth engine client, plus host
//! telemetry endpoints. The `berthd` binary wires configuration, logging and
//! the listener around [`create_router`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod api;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod telemetry;
pub mod trace;

pub use api::{AppState, create_router};
