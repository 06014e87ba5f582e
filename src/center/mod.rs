//! M-Bus Center HTTP API
//!
//! Finds, checks and reads the meters attached to one center.

pub mod client;
pub mod types;

pub use client::{CenterClient, HttpTransport, Transport};
pub use types::*;
