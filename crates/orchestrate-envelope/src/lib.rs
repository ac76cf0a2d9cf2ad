//! # orchestrate-envelope
//!
//! Wire-level types for the orchestration runtime: the compressed
//! orchestrated message body carried between function invocations, the
//! API Gateway proxy request/response shapes, and the header conventions
//! that carry correlation identity across a sequence.

pub mod compress;
pub mod error;
pub mod gateway;
pub mod headers;
pub mod message;

pub use compress::*;
pub use error::*;
pub use gateway::*;
pub use headers::*;
pub use message::*;
