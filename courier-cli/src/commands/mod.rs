//! CLI command implementations.

pub mod config;
pub mod enqueue;
pub mod inspect;
pub mod render;
pub mod worker;
