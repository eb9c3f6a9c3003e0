//! Core types and error definitions for the Synapse task engine.
//!
//! This crate provides the foundational types shared across all Synapse crates:
//! the unified error enum and the JSON shapes used for tool parameters and
//! results.
//!
//! # Main types
//!
//! - [`SynapseError`]: Unified error enum for all Synapse subsystems.
//! - [`SynapseResult`]: Convenience alias for `Result<T, SynapseError>`.
//! - [`Params`]: A step's named tool parameters.

/// Error types shared by every Synapse crate.
pub mod error;

pub use error::{SynapseError, SynapseResult};

/// Named parameters passed to a tool invocation.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Free-form context attached to a task at plan time.
pub type Context = serde_json::Map<String, serde_json::Value>;
