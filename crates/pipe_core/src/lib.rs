//! Pipeline composition and execution engine
//!
//! A [`Pipe`] is an unconnected description of stages. Composing a source
//! with a sink builds the live chain, drives it with ticks and returns the
//! value captured by a [`FinalActor`].
//!
//! ```
//! use contracts::{BoxTarget, Flow, PipeResult, Target, Value};
//! use pipe_core::Pipe;
//!
//! struct Once(Option<Value>, BoxTarget);
//!
//! impl Target for Once {
//!     fn push(&mut self, _tick: Value) -> PipeResult<Flow> {
//!         match self.0.take() {
//!             Some(v) => self.1.push(v),
//!             None => self.1.close().map(|()| Flow::Done),
//!         }
//!     }
//!     fn close(&mut self) -> PipeResult<()> {
//!         self.1.close()
//!     }
//! }
//!
//! struct Last(Option<Value>, BoxTarget);
//!
//! impl Target for Last {
//!     fn push(&mut self, v: Value) -> PipeResult<Flow> {
//!         self.0 = Some(v);
//!         Ok(Flow::Continue)
//!     }
//!     fn close(&mut self) -> PipeResult<()> {
//!         if let Some(v) = self.0.take() {
//!             self.1.push(v)?;
//!         }
//!         self.1.close()
//!     }
//! }
//!
//! let source = Pipe::source("once", |t| Box::new(Once(Some(Value::Int(7)), t)));
//! let sink = Pipe::sink("last", |t| Box::new(Last(None, t)));
//! assert_eq!(source.run(sink).unwrap(), Value::Int(7));
//! ```

mod attach;
mod chain;
mod driver;
mod fan;
mod final_actor;
mod frozen;
mod pipe;
mod shared;

#[cfg(test)]
mod testing;

pub use attach::attach;
pub use chain::{build_chain, Link};
pub use driver::{drive, pump, pump_reported};
pub use fan::Split;
pub use final_actor::{FinalActor, ResultSlot};
pub use frozen::FrozenSink;
pub use pipe::{compose, split, Composed, Expr, Pipe, Shape};
pub use shared::{CloseAbsorber, SharedTarget};
