//! Target protocol: the push/close contract every stage implements.

use std::rc::Rc;

use crate::{PipeResult, Value};

/// Outcome of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The target accepts further input
    Continue,
    /// The target has finished: everything downstream of it is already
    /// closed, and it must receive neither another push nor a close.
    Done,
}

impl Flow {
    #[inline]
    pub fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Push-based pipeline target
///
/// `close` is delivered at most once, and never after `push` returned
/// [`Flow::Done`]. A stage uses `close` to flush buffered state downstream
/// before closing its own downstream.
pub trait Target {
    /// Deliver one element
    fn push(&mut self, value: Value) -> PipeResult<Flow>;

    /// Signal end of stream
    fn close(&mut self) -> PipeResult<()>;
}

/// Owned, type-erased target
pub type BoxTarget = Box<dyn Target>;

/// Stage constructor: wraps a downstream target into an upstream-facing one
pub type Stage = Rc<dyn Fn(BoxTarget) -> BoxTarget>;

impl<T: Target + ?Sized> Target for Box<T> {
    #[inline]
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        (**self).push(value)
    }

    #[inline]
    fn close(&mut self) -> PipeResult<()> {
        (**self).close()
    }
}

/// Element-producing side of a source stage
///
/// Sources are driven by tick pushes; each tick asks for one element.
pub trait Producer {
    /// Next element, or `None` once exhausted
    fn next_value(&mut self) -> PipeResult<Option<Value>>;
}

impl<I: Iterator<Item = Value>> Producer for I {
    fn next_value(&mut self) -> PipeResult<Option<Value>> {
        Ok(self.next())
    }
}
