//! Container lifecycle management for the Berth service.
//!
//! - [`translate`] maps engine-agnostic requests to engine wire shapes and
//!   normalizes engine state back into [`ContainerState`](berth_common::types::ContainerState).
//! - [`backend`] is the seam to a concrete engine (Docker, or the in-process
//!   [`MemoryEngine`](backend::memory::MemoryEngine)).
//! - [`client`] issues lifecycle operations and is the only place engine
//!   failures become [`EngineError`](error::EngineError).

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod backend;
pub mod client;
pub mod error;
pub mod translate;

pub use client::{EngineClient, ListEntry};
pub use error::{EngineError, EngineVerb};
