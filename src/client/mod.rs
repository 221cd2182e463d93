//! The dialing client role.

mod client;

pub use client::dial;
