//! # Contracts
//!
//! Shared interface contracts for the pipeline workspace: the element type,
//! the push/close target protocol, the error taxonomy and the declarative
//! blueprint. All business crates depend on this crate; reverse dependencies
//! are prohibited.

mod blueprint;
mod error;
mod report;
mod target;
mod value;

pub use blueprint::*;
pub use error::*;
pub use report::*;
pub use target::*;
pub use value::Value;
