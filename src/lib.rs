//! Sure Feeder Access library.
//!
//! Switch entities that grant or revoke a pet's access to a Sure Petcare
//! feeder through the vendor cloud, confirming each change against the
//! polled snapshot cache.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod switch;
