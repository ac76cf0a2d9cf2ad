//! # orchestrate-sequence
//!
//! The sequence model: an ordered plan of function invocations with a
//! progression state machine (assigned → active → completed, with
//! conditional skips), dynamic parameter resolution from prior step
//! responses, short-ARN expansion, and the unbox/box codec that moves a
//! sequence between its wire form and the in-memory model.

pub mod arn;
pub mod condition;
pub mod dynamic;
pub mod error;
pub mod sequence;
pub mod step;
pub mod unbox;

pub use arn::*;
pub use condition::*;
pub use dynamic::*;
pub use error::*;
pub use sequence::*;
pub use step::*;
pub use unbox::*;
