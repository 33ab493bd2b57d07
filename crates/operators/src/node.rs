//! Adapter from per-element operator logic to the push/close protocol.

use contracts::{BoxTarget, Flow, PipeResult, Target, Value};
use pipe_core::Pipe;

/// Downstream handle given to an [`Operator`]
///
/// Tracks whether downstream has finished so operators never push into, or
/// close, a finished target.
pub struct Emitter {
    downstream: BoxTarget,
    done: bool,
}

impl Emitter {
    fn new(downstream: BoxTarget) -> Self {
        Self {
            downstream,
            done: false,
        }
    }

    /// Push one value; a no-op once downstream has finished
    pub fn emit(&mut self, value: Value) -> PipeResult<()> {
        if !self.done && self.downstream.push(value)?.is_done() {
            self.done = true;
        }
        Ok(())
    }

    /// Close downstream now and stop accepting input
    pub fn finish(&mut self) -> PipeResult<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.downstream.close()
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Stateful per-element logic of a middle or sink stage
pub trait Operator: 'static {
    /// Handle one upstream element
    fn on_value(&mut self, value: Value, out: &mut Emitter) -> PipeResult<()>;

    /// Flush buffered state; downstream is closed afterwards
    fn on_close(&mut self, _out: &mut Emitter) -> PipeResult<()> {
        Ok(())
    }
}

/// Target wrapping one [`Operator`] instance
pub struct Node<T> {
    op: T,
    out: Emitter,
}

impl<T: Operator> Node<T> {
    pub fn boxed(op: T, downstream: BoxTarget) -> BoxTarget {
        Box::new(Self {
            op,
            out: Emitter::new(downstream),
        })
    }
}

impl<T: Operator> Target for Node<T> {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        if self.out.done {
            return Ok(Flow::Done);
        }
        self.op.on_value(value, &mut self.out)?;
        Ok(if self.out.done {
            Flow::Done
        } else {
            Flow::Continue
        })
    }

    fn close(&mut self) -> PipeResult<()> {
        if self.out.done {
            return Ok(());
        }
        self.op.on_close(&mut self.out)?;
        self.out.finish()
    }
}

/// A middle pipe instantiating a fresh operator per chain
pub fn middle<T, F>(label: &str, make: F) -> Pipe
where
    T: Operator,
    F: Fn() -> T + 'static,
{
    Pipe::middle(label, move |downstream| Node::boxed(make(), downstream))
}

/// A sink pipe instantiating a fresh operator per chain
pub fn sink<T, F>(label: &str, make: F) -> Pipe
where
    T: Operator,
    F: Fn() -> T + 'static,
{
    Pipe::sink(label, move |downstream| Node::boxed(make(), downstream))
}
