//! # orchestrate-errors
//!
//! The error taxonomy of the orchestration runtime and the user-facing
//! matcher that decides what happens to errors a handler throws: wrap
//! them, resolve them with a callback, forward them to another function,
//! or fall through to the configured default policy.

pub mod matcher;
pub mod response;
pub mod taxonomy;

pub use matcher::*;
pub use response::*;
pub use taxonomy::*;
