//! nnfplace Common - Shared types and utilities
//!
//! This crate provides the record types exchanged between the allocation
//! engine and its collaborators, the common error type, and the operator
//! configuration that placement policy is built from.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, PlacementConfig};
pub use error::{Error, Result};
pub use types::*;
