//! # sapphire-shared
//!
//! Identifier types, enums and validation limits shared between the
//! storage engine and the network layer that embeds it.

pub mod constants;
pub mod types;

pub use types::*;
