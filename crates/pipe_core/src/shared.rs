//! Shared downstream targets and the close-absorbing relay.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use contracts::{BoxTarget, Flow, PipeResult, Target, Value};

struct SharedInner {
    target: BoxTarget,
    finished: bool,
}

/// A target reachable from several upstream chains
///
/// Clones share the same underlying target. Once it is closed or reports
/// `Done`, every further push answers `Done` and close is a no-op.
#[derive(Clone)]
pub struct SharedTarget(Rc<RefCell<SharedInner>>);

impl fmt::Debug for SharedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTarget")
            .field("finished", &self.is_finished())
            .field("handles", &Rc::strong_count(&self.0))
            .finish()
    }
}

impl SharedTarget {
    pub fn new(target: BoxTarget) -> Self {
        Self(Rc::new(RefCell::new(SharedInner {
            target,
            finished: false,
        })))
    }

    /// Whether the underlying target has been closed or finished
    pub fn is_finished(&self) -> bool {
        self.0.borrow().finished
    }
}

impl Target for SharedTarget {
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        let mut inner = self.0.borrow_mut();
        if inner.finished {
            return Ok(Flow::Done);
        }
        let flow = inner.target.push(value)?;
        if flow.is_done() {
            inner.finished = true;
        }
        Ok(flow)
    }

    fn close(&mut self) -> PipeResult<()> {
        let mut inner = self.0.borrow_mut();
        if inner.finished {
            return Ok(());
        }
        inner.finished = true;
        inner.target.close()
    }
}

/// Passes pushes through but swallows close
///
/// Lets many independent runs feed one long-lived chain; only the owner of
/// the [`SharedTarget`] closes it.
#[derive(Debug, Clone)]
pub struct CloseAbsorber {
    inner: SharedTarget,
}

impl CloseAbsorber {
    pub fn new(inner: SharedTarget) -> Self {
        Self { inner }
    }
}

impl Target for CloseAbsorber {
    #[inline]
    fn push(&mut self, value: Value) -> PipeResult<Flow> {
        self.inner.push(value)
    }

    #[inline]
    fn close(&mut self) -> PipeResult<()> {
        Ok(())
    }
}
