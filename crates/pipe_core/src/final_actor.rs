//! Terminal value capture.

use std::cell::RefCell;
use std::rc::Rc;

use contracts::{Flow, PipeError, PipeResult, Target, Value};

#[derive(Debug, Default)]
struct SlotState {
    last: Option<Value>,
    closed: bool,
}

/// Read side of a [`FinalActor`]
#[derive(Debug, Clone, Default)]
pub struct ResultSlot(Rc<RefCell<SlotState>>);

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A value was pushed and the actor has been closed
    pub fn is_available(&self) -> bool {
        let state = self.0.borrow();
        state.closed && state.last.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().closed
    }

    /// Take the captured result
    ///
    /// # Errors
    /// `NoResult` if the actor is still open or never received a value.
    pub fn take(&self) -> PipeResult<Value> {
        let mut state = self.0.borrow_mut();
        if !state.closed {
            return Err(PipeError::NoResult);
        }
        state.last.take().ok_or(PipeError::NoResult)
    }
}

/// Terminal target that keeps only the most recent value
#[derive(Debug)]
pub struct FinalActor {
    slot: ResultSlot,
}

impl FinalActor {
    /// Create an actor and the slot its result lands in
    pub fn new() -> (Self, ResultSlot) {
        let slot = ResultSlot::new();
        (Self { slot: slot.clone() }, slot)
    }
}

impl Target for FinalActor {
    #[inline]
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        self.slot.0.borrow_mut().last = Some(value);
        Ok(Flow::Continue)
    }

    fn close(&mut self) -> PipeResult<()> {
        let mut state = self.slot.0.borrow_mut();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        if state.last.is_none() {
            return Err(PipeError::NoResult);
        }
        Ok(())
    }
}
